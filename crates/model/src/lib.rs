//! Provider-agnostic model boundary: a single `generate` call the
//! orchestrator drives each turn, plus an in-process scripted double for
//! tests. Concrete vendor adapters live outside this workspace.

pub mod echo;
pub mod scripted;
pub mod traits;

pub use echo::EchoModel;
pub use scripted::ScriptedModel;
pub use traits::{GenerateRequest, GenerateResponse, Model};
