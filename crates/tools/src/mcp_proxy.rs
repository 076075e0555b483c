//! Registers an MCP server's advertised tools into a [`ToolRegistry`] as
//! local proxy tools, each of which issues `tools/call` through a cached
//! client when invoked.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use agentsdk_domain::error::{Error, Result};
use agentsdk_domain::message::{ToolDescriptor, ToolResult};
use agentsdk_mcp_client::{
    Client, McpTransport, McpToolDef, SseConfig, SseTransport, StdioSpawnConfig, StdioTransport,
};

use crate::tool::Tool;

/// Either flavor of MCP transport, behind one concrete type so a single
/// [`Client`] instantiation can carry either.
pub enum ProxyTransport {
    Stdio(StdioTransport),
    Sse(SseTransport),
}

#[async_trait]
impl McpTransport for ProxyTransport {
    async fn call(&self, method: &str, params: Option<Value>) -> Result<agentsdk_mcp_client::JsonRpcResponse> {
        match self {
            ProxyTransport::Stdio(t) => t.call(method, params).await,
            ProxyTransport::Sse(t) => t.call(method, params).await,
        }
    }

    async fn notify(&self, method: &str) -> Result<()> {
        match self {
            ProxyTransport::Stdio(t) => t.notify(method).await,
            ProxyTransport::Sse(t) => t.notify(method).await,
        }
    }

    fn is_alive(&self) -> bool {
        match self {
            ProxyTransport::Stdio(t) => t.is_alive(),
            ProxyTransport::Sse(t) => t.is_alive(),
        }
    }

    async fn close(&self) {
        match self {
            ProxyTransport::Stdio(t) => t.close().await,
            ProxyTransport::Sse(t) => t.close().await,
        }
    }
}

/// A remote tool callable as if it were local: `execute` round-trips
/// through the cached MCP client's `tools/call`.
pub struct McpProxyTool {
    def: McpToolDef,
    client: Arc<Client<ProxyTransport>>,
}

#[async_trait]
impl Tool for McpProxyTool {
    fn name(&self) -> &str {
        &self.def.name
    }

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.def.name.clone(),
            description: self.def.description.clone(),
            input_schema: self.def.input_schema.clone(),
        }
    }

    async fn execute(&self, params: Value) -> Result<ToolResult> {
        let call_result = self.client.call_tool(&self.def.name, params).await?;
        let output = call_result
            .content
            .into_iter()
            .map(|c| c.text)
            .collect::<Vec<_>>()
            .join("\n");
        if call_result.is_error {
            Ok(ToolResult::failed(output))
        } else {
            Ok(ToolResult::ok(output))
        }
    }
}

/// A command path looks like an executable (has a path separator, or names
/// a bare word with no scheme) while a URL carries `http://`/`https://`.
fn looks_like_url(endpoint: &str) -> bool {
    endpoint.starts_with("http://") || endpoint.starts_with("https://")
}

/// Connects to the MCP server at `endpoint` (stdio if it looks like a
/// command, SSE if it looks like a URL), lists its tools, and registers a
/// proxy [`Tool`] per descriptor into `registry`.
pub async fn register_mcp_server(
    registry: &crate::registry::ToolRegistry,
    endpoint: &str,
) -> Result<usize> {
    let transport = if looks_like_url(endpoint) {
        ProxyTransport::Sse(SseTransport::connect(SseConfig {
            base_url: endpoint.to_string(),
            heartbeat_interval: Duration::from_secs(30),
            reconnect_initial: Duration::from_millis(200),
            reconnect_max: Duration::from_secs(10),
        })?)
    } else {
        let (command, args) = split_command(endpoint);
        ProxyTransport::Stdio(
            StdioTransport::spawn(StdioSpawnConfig {
                command: &command,
                args: &args,
                env: &[],
                cwd: None,
                startup_timeout: Duration::from_secs(5),
            })
            .await?,
        )
    };

    let client = Arc::new(Client::new(transport));
    client.initialize().await?;
    let tools = client.list_tools().await?;

    let mut registered = 0;
    for def in tools {
        let proxy = Arc::new(McpProxyTool { def, client: client.clone() });
        registry.register(proxy).map_err(|e| {
            Error::Other(format!("failed to register MCP tool: {e}"))
        })?;
        registered += 1;
    }
    Ok(registered)
}

fn split_command(endpoint: &str) -> (String, Vec<String>) {
    let mut parts = endpoint.split_whitespace();
    let command = parts.next().unwrap_or_default().to_string();
    let args = parts.map(str::to_string).collect();
    (command, args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_endpoint_is_detected() {
        assert!(looks_like_url("https://example.com/mcp"));
        assert!(!looks_like_url("/usr/local/bin/my-mcp-server"));
        assert!(!looks_like_url("npx some-server"));
    }

    #[test]
    fn split_command_separates_args() {
        let (cmd, args) = split_command("npx -y some-server --flag");
        assert_eq!(cmd, "npx");
        assert_eq!(args, vec!["-y", "some-server", "--flag"]);
    }
}
