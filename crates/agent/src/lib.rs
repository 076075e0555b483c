//! Agent orchestrator core, plus the HTTP façade that drives it over
//! `POST /api/run`, `GET /api/run/stream`, and `GET /health`.

pub mod hooks;
pub mod http;
pub mod orchestrator;

pub use hooks::{Hook, HookChain};
pub use http::{router, AppState};
pub use orchestrator::{Orchestrator, RunOptions, RunResult};
