use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use agentsdk_domain::error::{Error, Result};
use agentsdk_domain::message::Message;
use agentsdk_wal::Entry;

pub const MESSAGE_KIND: &str = "message";
pub const CHECKPOINT_KIND: &str = "checkpoint";
pub const RESUME_KIND: &str = "resume";

#[derive(Serialize, Deserialize)]
pub struct CheckpointPayload {
    pub name: String,
    pub snapshot: Vec<Message>,
    pub created: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
pub struct ResumePayload {
    pub name: String,
}

pub fn message_entry(msg: &Message) -> Result<Entry> {
    let data = serde_json::to_vec(msg).map_err(Error::Json)?;
    Ok(Entry::new(MESSAGE_KIND, data))
}

pub fn checkpoint_entry(payload: &CheckpointPayload) -> Result<Entry> {
    let data = serde_json::to_vec(payload).map_err(Error::Json)?;
    Ok(Entry::new(CHECKPOINT_KIND, data))
}

pub fn resume_entry(payload: &ResumePayload) -> Result<Entry> {
    let data = serde_json::to_vec(payload).map_err(Error::Json)?;
    Ok(Entry::new(RESUME_KIND, data))
}

/// What replaying one WAL record does to a transcript under reconstruction.
pub enum Applied {
    Message(Message),
    Checkpoint(CheckpointPayload),
    Resume(ResumePayload),
}

/// Decode one WAL entry back into its typed payload. Unknown kinds fail
/// recovery outright rather than being skipped.
pub fn decode(entry: &Entry) -> Result<Applied> {
    match entry.entry_type.as_str() {
        MESSAGE_KIND => {
            let msg: Message = serde_json::from_slice(&entry.data).map_err(Error::Json)?;
            Ok(Applied::Message(msg))
        }
        CHECKPOINT_KIND => {
            let payload: CheckpointPayload = serde_json::from_slice(&entry.data).map_err(Error::Json)?;
            Ok(Applied::Checkpoint(payload))
        }
        RESUME_KIND => {
            let payload: ResumePayload = serde_json::from_slice(&entry.data).map_err(Error::Json)?;
            Ok(Applied::Resume(payload))
        }
        other => Err(Error::Integrity(format!("unknown wal record kind: {other}"))),
    }
}

/// Trim whitespace and reject empty names; case is otherwise preserved.
pub fn normalize_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation("checkpoint name must not be empty".into()));
    }
    Ok(trimmed.to_string())
}
