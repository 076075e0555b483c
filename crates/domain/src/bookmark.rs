use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Position token into an EventStore. Comparison is by `seq` alone; a nil
/// bookmark (`None`) sorts below any non-nil bookmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventBookmark {
    pub seq: i64,
    pub timestamp: DateTime<Utc>,
}

impl EventBookmark {
    pub fn new(seq: i64, timestamp: DateTime<Utc>) -> Self {
        Self { seq, timestamp }
    }
}

/// Position token into a session's WAL, with optional opaque snapshot state.
/// `Advance` never moves it backwards; `Snapshot` overwrites `state` in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointBookmark {
    pub id: String,
    pub position: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<serde_json::Value>,
}

impl CheckpointBookmark {
    pub fn new(id: impl Into<String>, position: u64) -> Self {
        Self {
            id: id.into(),
            position,
            state: None,
        }
    }

    /// Moves this bookmark forward; refuses to move it to an earlier position.
    pub fn advance(&mut self, position: u64) -> bool {
        if position < self.position {
            return false;
        }
        self.position = position;
        true
    }

    pub fn snapshot(&mut self, state: serde_json::Value) {
        self.state = Some(state);
    }
}
