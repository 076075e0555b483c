//! Typed client above a [`McpTransport`]: runs pre-flight hooks before every
//! call, decodes results into caller-chosen types, and caches `tools/list`.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;

use agentsdk_domain::error::{Error, Result};

use crate::protocol::{initialize_params, McpToolDef, ToolCallResult, ToolsListResult};
use crate::transport::McpTransport;

/// Runs before every `call`; returning an error aborts the call before it
/// reaches the transport.
pub type PreflightHook = Box<dyn Fn(&str, Option<&Value>) -> Result<()> + Send + Sync>;

pub struct Client<T: McpTransport> {
    transport: T,
    preflight: Vec<PreflightHook>,
    tools_cache: Mutex<Option<(Instant, Vec<McpToolDef>)>>,
    tools_ttl: Duration,
}

impl<T: McpTransport> Client<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            preflight: Vec::new(),
            tools_cache: Mutex::new(None),
            tools_ttl: Duration::from_secs(60),
        }
    }

    pub fn with_preflight_hook(mut self, hook: PreflightHook) -> Self {
        self.preflight.push(hook);
        self
    }

    /// `ttl <= 0` disables caching of `tools/list`.
    pub fn with_tools_ttl(mut self, ttl: Duration) -> Self {
        self.tools_ttl = ttl;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn run_preflight(&self, method: &str, params: Option<&Value>) -> Result<()> {
        for hook in &self.preflight {
            hook(method, params)?;
        }
        Ok(())
    }

    /// Send a request and decode its result into `D`. RPC errors are
    /// propagated verbatim via [`Error::Rpc`].
    pub async fn call<D: DeserializeOwned>(&self, method: &str, params: Option<Value>) -> Result<D> {
        self.run_preflight(method, params.as_ref())?;
        let response = self.transport.call(method, params).await?;
        let value = response
            .into_result()
            .map_err(|e| Error::Rpc { code: e.code, message: e.message })?;
        serde_json::from_value(value).map_err(Error::Json)
    }

    pub async fn notify(&self, method: &str) -> Result<()> {
        self.run_preflight(method, None)?;
        self.transport.notify(method).await
    }

    pub async fn initialize(&self) -> Result<Value> {
        let params = serde_json::to_value(initialize_params()).map_err(Error::Json)?;
        self.call("initialize", Some(params)).await
    }

    /// `tools/list`, cached under the configured TTL. Returned descriptors
    /// are a deep copy of the cached entry, never an alias into it.
    pub async fn list_tools(&self) -> Result<Vec<McpToolDef>> {
        if let Some(cached) = self.cached_tools() {
            return Ok(cached);
        }
        let result: ToolsListResult = self.call("tools/list", None).await?;
        *self.tools_cache.lock() = Some((Instant::now(), result.tools.clone()));
        Ok(result.tools)
    }

    fn cached_tools(&self) -> Option<Vec<McpToolDef>> {
        let guard = self.tools_cache.lock();
        let (fetched_at, tools) = guard.as_ref()?;
        if self.tools_ttl > Duration::ZERO && fetched_at.elapsed() > self.tools_ttl {
            return None;
        }
        Some(tools.clone())
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolCallResult> {
        self.call("tools/call", Some(serde_json::json!({ "name": name, "arguments": arguments }))).await
    }

    pub fn is_alive(&self) -> bool {
        self.transport.is_alive()
    }

    pub async fn close(&self) {
        self.transport.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use crate::protocol::JsonRpcResponse;

    struct ScriptedTransport {
        responses: Mutex<Vec<Value>>,
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl McpTransport for ScriptedTransport {
        async fn call(&self, _method: &str, _params: Option<Value>) -> Result<JsonRpcResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let result = self.responses.lock().pop().unwrap_or(Value::Null);
            Ok(JsonRpcResponse { jsonrpc: "2.0".into(), id: "1".into(), result: Some(result), error: None })
        }
        async fn notify(&self, _method: &str) -> Result<()> {
            Ok(())
        }
        fn is_alive(&self) -> bool {
            true
        }
        async fn close(&self) {}
    }

    fn tools_payload() -> Value {
        serde_json::json!({ "tools": [{ "name": "read_file", "description": "", "inputSchema": {} }] })
    }

    #[tokio::test]
    async fn list_tools_is_cached_until_ttl_expires() {
        let calls = Arc::new(AtomicU32::new(0));
        let transport = ScriptedTransport {
            responses: Mutex::new(vec![tools_payload(), tools_payload()]),
            calls: calls.clone(),
        };
        let client = Client::new(transport).with_tools_ttl(Duration::from_millis(20));

        let first = client.list_tools().await.unwrap();
        let second = client.list_tools().await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1, "second call should hit the cache");

        tokio::time::sleep(Duration::from_millis(30)).await;
        let third = client.list_tools().await.unwrap();
        assert_eq!(third.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2, "expired entry should be refetched");
    }

    #[tokio::test]
    async fn preflight_hook_can_reject_a_call() {
        let transport = ScriptedTransport { responses: Mutex::new(vec![Value::Null]), calls: Arc::new(AtomicU32::new(0)) };
        let client = Client::new(transport).with_preflight_hook(Box::new(|method, _| {
            if method == "forbidden/op" {
                Err(Error::Validation("blocked by policy".into()))
            } else {
                Ok(())
            }
        }));
        let result: Result<Value> = client.call("forbidden/op", None).await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn rpc_error_is_propagated_verbatim() {
        struct FailingTransport;
        #[async_trait]
        impl McpTransport for FailingTransport {
            async fn call(&self, _m: &str, _p: Option<Value>) -> Result<JsonRpcResponse> {
                Ok(JsonRpcResponse {
                    jsonrpc: "2.0".into(),
                    id: "1".into(),
                    result: None,
                    error: Some(crate::protocol::JsonRpcError { code: -32601, message: "Method not found".into(), data: None }),
                })
            }
            async fn notify(&self, _m: &str) -> Result<()> {
                Ok(())
            }
            fn is_alive(&self) -> bool {
                true
            }
            async fn close(&self) {}
        }
        let client = Client::new(FailingTransport);
        let result: Result<Value> = client.call("whatever", None).await;
        match result {
            Err(Error::Rpc { code, message }) => {
                assert_eq!(code, -32601);
                assert_eq!(message, "Method not found");
            }
            other => panic!("expected Rpc error, got {other:?}"),
        }
    }
}
