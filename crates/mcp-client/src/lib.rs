//! MCP client: JSON-RPC over stdio or HTTP+SSE, with retry and session
//! caching layered on top of a common [`transport::McpTransport`] trait.

mod cache;
mod client;
mod pending;
mod protocol;
mod retry;
mod transport;

pub use cache::SessionCache;
pub use client::{Client, PreflightHook};
pub use pending::PendingTracker;
pub use protocol::{
    initialize_params, ClientInfo, IdAllocator, InitializeParams, JsonRpcError,
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, McpToolDef, ToolCallContent,
    ToolCallResult, ToolsListResult,
};
pub use retry::{default_retryable, exponential_backoff, Backoff, Retryable, RetryTransport};
pub use transport::{McpTransport, SseConfig, SseTransport, StdioSpawnConfig, StdioTransport};
