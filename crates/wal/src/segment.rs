//! Segment file naming, whole-segment scanning, and the persisted truncate
//! base.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use agentsdk_domain::error::{Error, Result};

use crate::record::{decode, Decoded, Entry};

pub fn segment_path(dir: &Path, index: u32) -> PathBuf {
    dir.join(format!("segment-{index:06}.wal"))
}

/// List existing segment indices in `dir`, ascending. Lexicographic order on
/// the zero-padded filename matches numeric order.
pub fn list_segment_indices(dir: &Path) -> Result<Vec<u32>> {
    let mut indices = Vec::new();
    for entry in fs::read_dir(dir).map_err(Error::Io)? {
        let entry = entry.map_err(Error::Io)?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if let Some(stem) = name.strip_prefix("segment-").and_then(|s| s.strip_suffix(".wal")) {
            if let Ok(idx) = stem.parse::<u32>() {
                indices.push(idx);
            }
        }
    }
    indices.sort_unstable();
    Ok(indices)
}

/// One successfully decoded record plus its byte offset within the segment.
pub struct ScannedEntry {
    pub local_offset: u64,
    pub entry: Entry,
}

/// Scan a segment file front-to-back, decoding records until the first torn
/// or incomplete record. Returns the good entries plus the number of valid
/// bytes (i.e. where the file should be trimmed to discard any torn tail).
pub fn scan_segment(path: &Path) -> Result<(Vec<ScannedEntry>, u64)> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
        Err(e) => return Err(Error::Io(e)),
    };

    let mut entries = Vec::new();
    let mut offset: u64 = 0;
    loop {
        let remaining = &bytes[offset as usize..];
        match decode(remaining) {
            Decoded::Ok { entry, consumed } => {
                entries.push(ScannedEntry {
                    local_offset: offset,
                    entry,
                });
                offset += consumed as u64;
            }
            Decoded::Incomplete | Decoded::Torn(_) => break,
        }
    }
    Ok((entries, offset))
}

fn base_path(dir: &Path) -> PathBuf {
    dir.join("BASE")
}

/// Reads the persisted truncate base — the number of bytes permanently
/// discarded below the head of the log by prior truncates — so positions
/// keep counting up across a truncate and a reopen instead of restarting
/// from 0. Defaults to 0 when no truncate has happened yet.
pub fn read_base(dir: &Path) -> Result<u64> {
    match fs::read_to_string(base_path(dir)) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|e| Error::Integrity(format!("malformed WAL base file: {e}"))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(Error::Io(e)),
    }
}

/// Persists the truncate base, crash-safe via write-temp -> fsync -> rename
/// -> fsync-parent-dir, the same ordering `rewrite_segment` uses.
pub fn write_base(dir: &Path, base: u64) -> Result<()> {
    let tmp_path = dir.join("BASE.tmp");
    {
        let mut tmp = fs::File::create(&tmp_path).map_err(Error::Io)?;
        tmp.write_all(base.to_string().as_bytes()).map_err(Error::Io)?;
        tmp.sync_all().map_err(Error::Io)?;
    }
    fs::rename(&tmp_path, base_path(dir)).map_err(Error::Io)?;
    if let Ok(dir_handle) = fs::File::open(dir) {
        let _ = dir_handle.sync_all();
    }
    Ok(())
}
