//! Library surface for embedding this runtime directly, re-exporting the
//! per-crate APIs `agentctl` itself is built from.

pub mod cli;
pub mod config;
pub mod telemetry;

pub use agentsdk_agent::{router, AppState, Hook, HookChain, Orchestrator, RunOptions, RunResult};
pub use agentsdk_domain::error::{Error, Result};
pub use agentsdk_events::{EventBus, EventBusOptions, SseStream};
pub use agentsdk_model::{EchoModel, Model};
pub use agentsdk_sessions::{FileSession, MemorySession, Session};
pub use agentsdk_tools::ToolRegistry;
pub use agentsdk_wal::Wal;

pub use config::Config;
