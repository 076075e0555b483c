//! Session transcripts: append, filtered listing, checkpoint/resume, fork.
//!
//! `MemorySession` keeps everything in process memory. `FileSession` is
//! built on `agentsdk-wal` and recovers its transcript and checkpoints by
//! replaying the log on open, so crashes mid-checkpoint or mid-resume never
//! leave a transcript that disagrees with what was durably recorded.

mod filter;
mod record;
mod session;

pub use filter::Filter;
pub use session::{FileSession, MemorySession, Session};
