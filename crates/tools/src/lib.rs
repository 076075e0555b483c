//! Tool registry and sandbox policies: the uniform call surface the agent
//! orchestrator invokes, whether a tool runs locally or is proxied through
//! an MCP server.

pub mod mcp_proxy;
pub mod registry;
pub mod sandbox;
pub mod tool;

pub use mcp_proxy::{register_mcp_server, McpProxyTool, ProxyTransport};
pub use registry::ToolRegistry;
pub use sandbox::{DomainAllowList, FilesystemAllowList, ResourceLimiter, ResourceUsage, SandboxManager};
pub use tool::{NoopValidator, RequiredFieldsValidator, Tool, Validator};
