//! Segmented write-ahead log: append, replay, truncate, crash recovery.
//!
//! A single writer is assumed; all operations take an internal lock, so
//! `Replay`/`Truncate` are exclusive with `Append`.

pub mod record;
pub mod segment;
#[allow(clippy::module_inception)]
mod wal;

pub use record::Entry;
pub use wal::{Wal, WalOptions};
