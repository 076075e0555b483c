//! On-disk record format for a single WAL entry.
//!
//! ```text
//! magic(u32) | version(u8) | type_len(u16) | data_len(u32) | type | data | crc32(u32)
//! ```
//!
//! The CRC (IEEE, `crc32fast`) covers everything from `version` through the
//! end of `data`, i.e. the header minus `magic` plus the payload. `magic` and
//! the trailing CRC itself are never covered.

use agentsdk_domain::error::{Error, Result};

pub const MAGIC: u32 = 0x5741_4C31; // "WAL1"
pub const VERSION: u8 = 1;

/// Fixed-size portion of the header: magic + version + type_len + data_len.
const FIXED_HEADER_LEN: usize = 4 + 1 + 2 + 4;
const CRC_LEN: usize = 4;

/// One entry appended to (or replayed from) the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub entry_type: String,
    pub data: Vec<u8>,
    /// Position this entry was (or will be) recorded at. Ignored on encode;
    /// filled in by the caller on append and by replay on read.
    pub position: u64,
}

impl Entry {
    pub fn new(entry_type: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            entry_type: entry_type.into(),
            data: data.into(),
            position: 0,
        }
    }
}

/// Encode `entry` into its on-disk byte representation.
pub fn encode(entry: &Entry) -> Result<Vec<u8>> {
    let type_bytes = entry.entry_type.as_bytes();
    if type_bytes.len() > u16::MAX as usize {
        return Err(Error::Validation("WAL entry type exceeds 65535 bytes".into()));
    }
    if entry.data.len() > u32::MAX as usize {
        return Err(Error::Validation("WAL entry data exceeds u32 bytes".into()));
    }

    let type_len = type_bytes.len() as u16;
    let data_len = entry.data.len() as u32;

    let mut buf = Vec::with_capacity(FIXED_HEADER_LEN + type_bytes.len() + entry.data.len() + CRC_LEN);
    buf.extend_from_slice(&MAGIC.to_le_bytes());

    let crc_start = buf.len();
    buf.push(VERSION);
    buf.extend_from_slice(&type_len.to_le_bytes());
    buf.extend_from_slice(&data_len.to_le_bytes());
    buf.extend_from_slice(type_bytes);
    buf.extend_from_slice(&entry.data);

    let crc = crc32fast::hash(&buf[crc_start..]);
    buf.extend_from_slice(&crc.to_le_bytes());
    Ok(buf)
}

/// The outcome of attempting to decode one record from a byte slice.
pub enum Decoded<'a> {
    /// A fully valid record, plus the number of bytes it occupied.
    Ok { entry: Entry, consumed: usize },
    /// Not enough bytes remain to even read the fixed header — this is the
    /// normal end-of-segment condition, not corruption.
    Incomplete,
    /// Enough bytes were present for a header, but content fails validation
    /// (bad magic, bad version, declared length overruns the buffer, or CRC
    /// mismatch). This terminates replay cleanly — it is not surfaced as an
    /// error to the caller.
    Torn(&'a str),
}

/// Attempt to decode a single record starting at the front of `buf`.
pub fn decode(buf: &[u8]) -> Decoded<'_> {
    if buf.len() < FIXED_HEADER_LEN {
        return Decoded::Incomplete;
    }

    let magic = u32::from_le_bytes(buf[0..4].try_into().unwrap());
    if magic != MAGIC {
        return Decoded::Torn("bad magic");
    }

    let crc_start = 4;
    let version = buf[4];
    if version != VERSION {
        return Decoded::Torn("unsupported version");
    }

    let type_len = u16::from_le_bytes(buf[5..7].try_into().unwrap()) as usize;
    let data_len = u32::from_le_bytes(buf[7..11].try_into().unwrap()) as usize;

    let payload_start = FIXED_HEADER_LEN;
    let payload_end = match payload_start.checked_add(type_len).and_then(|n| n.checked_add(data_len)) {
        Some(n) => n,
        None => return Decoded::Torn("length overflow"),
    };
    let record_end = payload_end + CRC_LEN;
    if record_end > buf.len() {
        return Decoded::Torn("declared length exceeds remaining bytes");
    }

    let crc_expected = u32::from_le_bytes(
        buf[payload_end..record_end].try_into().unwrap(),
    );
    let crc_actual = crc32fast::hash(&buf[crc_start..payload_end]);
    if crc_actual != crc_expected {
        return Decoded::Torn("crc mismatch");
    }

    let type_bytes = &buf[payload_start..payload_start + type_len];
    let data_bytes = &buf[payload_start + type_len..payload_end];

    let entry_type = match std::str::from_utf8(type_bytes) {
        Ok(s) => s.to_string(),
        Err(_) => return Decoded::Torn("type is not valid utf-8"),
    };

    Decoded::Ok {
        entry: Entry {
            entry_type,
            data: data_bytes.to_vec(),
            position: 0,
        },
        consumed: record_end,
    }
}
