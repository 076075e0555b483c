use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::Mutex;

use agentsdk_domain::bookmark::CheckpointBookmark;
use agentsdk_domain::error::{Error, Result};
use agentsdk_domain::message::Message;
use agentsdk_wal::{Wal, WalOptions};

use crate::filter::Filter;
use crate::record::{self, Applied, CheckpointPayload, ResumePayload};

struct CheckpointEntry {
    bookmark: CheckpointBookmark,
    snapshot: Vec<Message>,
}

/// A session transcript: an ordered log of messages with named checkpoints
/// that can be resumed, and the ability to fork an independent copy.
pub trait Session: Send + Sync {
    fn id(&self) -> &str;
    fn append(&self, msg: Message) -> Result<()>;
    fn list(&self, filter: &Filter) -> Result<Vec<Message>>;
    fn checkpoint(&self, name: &str) -> Result<()>;
    fn resume(&self, name: &str) -> Result<()>;
    fn fork(&self, child_id: &str) -> Result<Box<dyn Session>>;
    fn close(&self) -> Result<()>;
}

struct State {
    messages: Vec<Message>,
    checkpoints: std::collections::HashMap<String, CheckpointEntry>,
    seq: u64,
    closed: bool,
}

impl State {
    fn new() -> Self {
        Self {
            messages: Vec::new(),
            checkpoints: std::collections::HashMap::new(),
            seq: 0,
            closed: false,
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::SessionClosed);
        }
        Ok(())
    }

    fn prepare_append(&mut self, id: &str, mut msg: Message) -> Message {
        if msg.id.is_empty() {
            msg.id = format!("{id}-{}", self.seq);
        }
        if msg.is_zero_timestamp() {
            msg.timestamp = Utc::now();
        }
        msg
    }

    fn min_checkpoint_position(&self) -> Option<u64> {
        self.checkpoints.values().map(|c| c.bookmark.position).min()
    }
}

/// Purely in-memory session, for tests and ephemeral runs that don't need
/// crash durability.
pub struct MemorySession {
    id: String,
    state: Mutex<State>,
}

impl MemorySession {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: Mutex::new(State::new()),
        }
    }
}

impl Session for MemorySession {
    fn id(&self) -> &str {
        &self.id
    }

    fn append(&self, msg: Message) -> Result<()> {
        let mut state = self.state.lock();
        state.check_open()?;
        let msg = state.prepare_append(&self.id, msg);
        state.messages.push(msg);
        state.seq = state.messages.len() as u64;
        Ok(())
    }

    fn list(&self, filter: &Filter) -> Result<Vec<Message>> {
        let state = self.state.lock();
        state.check_open()?;
        Ok(filter.apply(&state.messages))
    }

    fn checkpoint(&self, name: &str) -> Result<()> {
        let name = record::normalize_name(name)?;
        let mut state = self.state.lock();
        state.check_open()?;
        let snapshot = state.messages.clone();
        let position = state.messages.len() as u64;
        state.checkpoints.insert(
            name.clone(),
            CheckpointEntry {
                bookmark: CheckpointBookmark::new(name, position),
                snapshot,
            },
        );
        Ok(())
    }

    fn resume(&self, name: &str) -> Result<()> {
        let name = record::normalize_name(name)?;
        let mut state = self.state.lock();
        state.check_open()?;
        let snapshot = state
            .checkpoints
            .get(&name)
            .map(|c| c.snapshot.clone())
            .ok_or_else(|| Error::CheckpointNotFound(name.clone()))?;
        state.seq = snapshot.len() as u64;
        state.messages = snapshot;
        Ok(())
    }

    fn fork(&self, child_id: &str) -> Result<Box<dyn Session>> {
        let state = self.state.lock();
        state.check_open()?;
        let child = MemorySession::new(child_id);
        {
            let mut child_state = child.state.lock();
            child_state.messages = state.messages.clone();
            child_state.seq = state.messages.len() as u64;
        }
        Ok(Box::new(child))
    }

    fn close(&self) -> Result<()> {
        self.state.lock().closed = true;
        Ok(())
    }
}

/// A durable session transcript backed by a write-ahead log: every append,
/// checkpoint and resume is recorded before it takes effect in memory, so a
/// crash mid-operation recovers cleanly on reopen.
pub struct FileSession {
    id: String,
    root: PathBuf,
    wal: Wal,
    state: Mutex<State>,
}

impl FileSession {
    /// Open (or recover) the session rooted at `dir`. `dir`'s parent is used
    /// as the root under which sibling/child session directories live, so
    /// `fork` can create `root/child_id` next to it.
    pub fn open(id: impl Into<String>, dir: impl AsRef<Path>, options: WalOptions) -> Result<Self> {
        let id = id.into();
        let dir = dir.as_ref().to_path_buf();
        let root = dir
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| dir.clone());
        let wal = Wal::open(&dir, options)?;

        let mut state = State::new();
        Self::recover(&wal, &mut state)?;

        tracing::info!(session = %id, messages = state.messages.len(), "session opened");

        Ok(Self {
            id,
            root,
            wal,
            state: Mutex::new(state),
        })
    }

    fn recover(wal: &Wal, state: &mut State) -> Result<()> {
        wal.replay(|_position, entry| {
            match record::decode(entry)? {
                Applied::Message(msg) => {
                    state.messages.push(msg);
                }
                Applied::Checkpoint(payload) => {
                    let position = state.messages.len() as u64;
                    state.messages = payload.snapshot.clone();
                    state.checkpoints.insert(
                        payload.name.clone(),
                        CheckpointEntry {
                            bookmark: CheckpointBookmark::new(payload.name.clone(), position),
                            snapshot: payload.snapshot,
                        },
                    );
                }
                Applied::Resume(payload) => {
                    let snapshot = state
                        .checkpoints
                        .get(&payload.name)
                        .map(|c| c.snapshot.clone())
                        .ok_or_else(|| Error::CheckpointNotFound(payload.name.clone()))?;
                    state.messages = snapshot;
                }
            }
            state.seq = state.messages.len() as u64;
            Ok(())
        })
    }

    fn gc(&self, state: &State) -> Result<()> {
        if let Some(min_position) = state.min_checkpoint_position() {
            self.wal.truncate(min_position)?;
        }
        Ok(())
    }
}

impl Session for FileSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn append(&self, msg: Message) -> Result<()> {
        let mut state = self.state.lock();
        state.check_open()?;
        let msg = state.prepare_append(&self.id, msg);
        self.wal.append(&record::message_entry(&msg)?)?;
        state.messages.push(msg);
        state.seq = state.messages.len() as u64;
        Ok(())
    }

    fn list(&self, filter: &Filter) -> Result<Vec<Message>> {
        let state = self.state.lock();
        state.check_open()?;
        Ok(filter.apply(&state.messages))
    }

    fn checkpoint(&self, name: &str) -> Result<()> {
        let name = record::normalize_name(name)?;
        let mut state = self.state.lock();
        state.check_open()?;

        let snapshot = state.messages.clone();
        let created = Utc::now();
        let position = self.wal.append(&record::checkpoint_entry(&CheckpointPayload {
            name: name.clone(),
            snapshot: snapshot.clone(),
            created,
        })?)?;

        state.checkpoints.insert(
            name.clone(),
            CheckpointEntry {
                bookmark: CheckpointBookmark::new(name, position),
                snapshot,
            },
        );

        self.gc(&state)?;
        tracing::info!(session = %self.id, "session checkpoint written");
        Ok(())
    }

    fn resume(&self, name: &str) -> Result<()> {
        let name = record::normalize_name(name)?;
        let mut state = self.state.lock();
        state.check_open()?;

        let snapshot = state
            .checkpoints
            .get(&name)
            .map(|c| c.snapshot.clone())
            .ok_or_else(|| Error::CheckpointNotFound(name.clone()))?;

        self.wal.append(&record::resume_entry(&ResumePayload { name: name.clone() })?)?;

        state.seq = snapshot.len() as u64;
        state.messages = snapshot;
        tracing::info!(session = %self.id, "session resumed");
        Ok(())
    }

    fn fork(&self, child_id: &str) -> Result<Box<dyn Session>> {
        let snapshot = {
            let state = self.state.lock();
            state.check_open()?;
            state.messages.clone()
        };

        let child_dir = self.root.join(child_id);
        let child = FileSession::open(child_id, &child_dir, WalOptions::default())?;

        for msg in snapshot {
            if let Err(e) = child.append(msg) {
                let _ = child.close();
                let _ = std::fs::remove_dir_all(&child_dir);
                return Err(e);
            }
        }

        tracing::info!(parent = %self.id, child = %child_id, "session forked");
        Ok(Box::new(child))
    }

    fn close(&self) -> Result<()> {
        self.state.lock().closed = true;
        self.wal.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentsdk_domain::message::Role;

    #[test]
    fn memory_append_assigns_id_and_timestamp() {
        let session = MemorySession::new("s1");
        session.append(Message::user("hi")).unwrap();
        let listed = session.list(&Filter::new()).unwrap();
        assert_eq!(listed[0].id, "s1-0");
        assert!(!listed[0].is_zero_timestamp());
    }

    #[test]
    fn s3_checkpoint_and_resume_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let session = FileSession::open("s1", dir.path().join("s1"), WalOptions::default()).unwrap();

        session.append(Message::user("one")).unwrap();
        session.append(Message::assistant("two")).unwrap();
        session.checkpoint("mark").unwrap();
        session.append(Message::user("three")).unwrap();

        session.resume("mark").unwrap();
        let after = session.list(&Filter::new()).unwrap();
        assert_eq!(after.len(), 2);
        assert_eq!(after[1].content, "two");
    }

    #[test]
    fn s3_checkpoint_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s1");
        {
            let session = FileSession::open("s1", &path, WalOptions::default()).unwrap();
            session.append(Message::user("one")).unwrap();
            session.checkpoint("mark").unwrap();
            session.append(Message::user("two")).unwrap();
        }

        let reopened = FileSession::open("s1", &path, WalOptions::default()).unwrap();
        reopened.resume("mark").unwrap();
        let after = reopened.list(&Filter::new()).unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].content, "one");
    }

    #[test]
    fn resume_unknown_name_fails() {
        let session = MemorySession::new("s1");
        let err = session.resume("nope").unwrap_err();
        assert!(matches!(err, Error::CheckpointNotFound(_)));
    }

    #[test]
    fn s4_fork_is_isolated_from_parent() {
        let dir = tempfile::tempdir().unwrap();
        let parent = FileSession::open("parent", dir.path().join("parent"), WalOptions::default()).unwrap();
        parent.append(Message::user("shared")).unwrap();

        let child = parent.fork("child").unwrap();
        child.append(Message::user("child-only")).unwrap();
        parent.append(Message::user("parent-only")).unwrap();

        let parent_msgs = parent.list(&Filter::new()).unwrap();
        let child_msgs = child.list(&Filter::new()).unwrap();

        assert_eq!(parent_msgs.len(), 2);
        assert_eq!(child_msgs.len(), 2);
        assert_eq!(child_msgs[1].content, "child-only");
        assert!(parent_msgs.iter().all(|m| m.content != "child-only"));
        assert!(child_msgs.iter().all(|m| m.content != "parent-only"));
    }

    #[test]
    fn closed_session_rejects_further_appends() {
        let session = MemorySession::new("s1");
        session.close().unwrap();
        assert!(matches!(session.append(Message::user("x")), Err(Error::SessionClosed)));
    }

    #[test]
    fn filter_by_role_over_file_session() {
        let dir = tempfile::tempdir().unwrap();
        let session = FileSession::open("s1", dir.path().join("s1"), WalOptions::default()).unwrap();
        session.append(Message::user("u")).unwrap();
        session.append(Message::assistant("a")).unwrap();
        let only_assistant = session.list(&Filter::new().with_role(Role::Assistant)).unwrap();
        assert_eq!(only_assistant.len(), 1);
        assert_eq!(only_assistant[0].content, "a");
    }
}
