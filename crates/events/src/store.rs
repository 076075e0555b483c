//! Append-only JSONL event store, keyed by `Bookmark`.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use agentsdk_domain::bookmark::EventBookmark;
use agentsdk_domain::error::{Error, Result};
use agentsdk_domain::event::Event;

struct Inner {
    last_bookmark: Option<EventBookmark>,
}

/// Durable, append-only log of events. Each append is fsync'd; malformed
/// lines are skipped on read rather than failing the whole scan.
pub struct EventStore {
    path: PathBuf,
    inner: Mutex<Inner>,
}

impl EventStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(Error::Io)?;
        }
        let last_bookmark = Self::scan_last_bookmark(&path)?;
        Ok(Self {
            path,
            inner: Mutex::new(Inner { last_bookmark }),
        })
    }

    fn read_lines(path: &Path) -> Result<Vec<String>> {
        match std::fs::read_to_string(path) {
            Ok(raw) => Ok(raw.lines().map(str::to_owned).collect()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn scan_last_bookmark(path: &Path) -> Result<Option<EventBookmark>> {
        let mut last = None;
        for line in Self::read_lines(path)? {
            if let Ok(event) = serde_json::from_str::<Event>(&line) {
                if event.bookmark.is_some() {
                    last = event.bookmark;
                }
            }
        }
        Ok(last)
    }

    /// Append `event`, which must already carry a bookmark.
    pub fn append(&self, event: &Event) -> Result<()> {
        if event.bookmark.is_none() {
            return Err(Error::Validation("event missing bookmark".into()));
        }

        let line = serde_json::to_string(event).map_err(Error::Json)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(Error::Io)?;
        writeln!(file, "{line}").map_err(Error::Io)?;
        file.sync_all().map_err(Error::Io)?;

        self.inner.lock().last_bookmark = event.bookmark;
        Ok(())
    }

    fn scan(&self) -> Result<Vec<Event>> {
        let mut events = Vec::new();
        for line in Self::read_lines(&self.path)? {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Event>(&line) {
                Ok(event) => events.push(event),
                Err(e) => tracing::warn!(error = %e, "skipping malformed event store line"),
            }
        }
        Ok(events)
    }

    /// Events whose bookmark compares strictly greater than `since`. `None`
    /// matches everything (nil sorts below any bookmark).
    pub fn read_since(&self, since: Option<EventBookmark>) -> Result<Vec<Event>> {
        Ok(self
            .scan()?
            .into_iter()
            .filter(|e| e.bookmark > since)
            .collect())
    }

    /// Events strictly after `start` and not past `end`; scanning stops at
    /// the first event exceeding `end`.
    pub fn read_range(&self, start: Option<EventBookmark>, end: EventBookmark) -> Result<Vec<Event>> {
        let mut out = Vec::new();
        for event in self.scan()? {
            if event.bookmark.map(|b| b > end).unwrap_or(false) {
                break;
            }
            if event.bookmark > start {
                out.push(event);
            }
        }
        Ok(out)
    }

    pub fn last_bookmark(&self) -> Option<EventBookmark> {
        self.inner.lock().last_bookmark
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentsdk_domain::event::{EventData, EventType, ProgressData};
    use chrono::Utc;

    fn event(seq: i64, msg: &str) -> Event {
        let mut e = Event::new(
            EventType::Progress,
            "s1",
            EventData::Progress(ProgressData { message: msg.into() }),
        );
        e.normalize();
        e.bookmark = Some(EventBookmark::new(seq, Utc::now()));
        e
    }

    #[test]
    fn bookmark_monotonicity_and_read_since() {
        let dir = tempfile::tempdir().unwrap();
        let store = EventStore::open(dir.path().join("events.jsonl")).unwrap();

        for i in 0..5 {
            store.append(&event(i, &format!("msg-{i}"))).unwrap();
        }

        let since = store.read_since(Some(EventBookmark::new(2, Utc::now()))).unwrap();
        assert_eq!(since.len(), 2);
        assert_eq!(since[0].bookmark.unwrap().seq, 3);
        assert_eq!(since[1].bookmark.unwrap().seq, 4);

        assert_eq!(store.last_bookmark().unwrap().seq, 4);
    }

    #[test]
    fn read_range_stops_at_end() {
        let dir = tempfile::tempdir().unwrap();
        let store = EventStore::open(dir.path().join("events.jsonl")).unwrap();
        for i in 0..10 {
            store.append(&event(i, "x")).unwrap();
        }
        let range = store
            .read_range(Some(EventBookmark::new(1, Utc::now())), EventBookmark::new(4, Utc::now()))
            .unwrap();
        assert_eq!(range.len(), 3);
        assert_eq!(range[0].bookmark.unwrap().seq, 2);
        assert_eq!(range.last().unwrap().bookmark.unwrap().seq, 4);
    }

    #[test]
    fn append_without_bookmark_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = EventStore::open(dir.path().join("events.jsonl")).unwrap();
        let mut e = event(0, "x");
        e.bookmark = None;
        assert!(store.append(&e).is_err());
    }

    #[test]
    fn skips_malformed_lines_on_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let store = EventStore::open(&path).unwrap();
        store.append(&event(0, "ok")).unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "not json").unwrap();
        store.append(&event(1, "ok2")).unwrap();

        let all = store.read_since(None).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn reopen_recovers_last_bookmark() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        {
            let store = EventStore::open(&path).unwrap();
            store.append(&event(0, "a")).unwrap();
            store.append(&event(1, "b")).unwrap();
        }
        let reopened = EventStore::open(&path).unwrap();
        assert_eq!(reopened.last_bookmark().unwrap().seq, 1);
    }
}
