//! Retry decorator: wraps any [`McpTransport`], re-issuing calls that fail
//! with a retryable error up to a bounded number of attempts.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use agentsdk_domain::error::{Error, Result};

use crate::transport::McpTransport;

pub type Backoff = Box<dyn Fn(u32) -> Duration + Send + Sync>;
pub type Retryable = Box<dyn Fn(&Error) -> bool + Send + Sync>;

/// Exponential backoff starting at `base`, capped at `max`.
pub fn exponential_backoff(base: Duration, max: Duration) -> Backoff {
    Box::new(move |attempt| {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        (base * factor).min(max)
    })
}

/// Retryable by default: timeouts are retryable; everything else (including
/// a canceled call) is not.
pub fn default_retryable() -> Retryable {
    Box::new(|err| matches!(err, Error::Timeout(_)))
}

pub struct RetryTransport<T: McpTransport> {
    inner: T,
    max_attempts: u32,
    backoff: Backoff,
    retryable: Retryable,
}

impl<T: McpTransport> RetryTransport<T> {
    pub fn new(inner: T, max_attempts: u32, backoff: Backoff, retryable: Retryable) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
            backoff,
            retryable,
        }
    }
}

#[async_trait]
impl<T: McpTransport> McpTransport for RetryTransport<T> {
    async fn call(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponseAlias> {
        let mut attempt = 1;
        loop {
            match self.inner.call(method, params.clone()).await {
                Ok(resp) => return Ok(resp),
                Err(err) => {
                    if attempt >= self.max_attempts || matches!(err, Error::Canceled) || !(self.retryable)(&err) {
                        return Err(err);
                    }
                    let delay = (self.backoff)(attempt);
                    tracing::debug!(attempt, method, ?delay, "retrying MCP call");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn notify(&self, method: &str) -> Result<()> {
        self.inner.notify(method).await
    }

    fn is_alive(&self) -> bool {
        self.inner.is_alive()
    }

    async fn close(&self) {
        self.inner.close().await
    }
}

// Local alias purely to keep the trait impl above readable; same type as
// `crate::protocol::JsonRpcResponse`.
type JsonRpcResponseAlias = crate::protocol::JsonRpcResponse;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct FlakyTransport {
        calls: Arc<AtomicU32>,
        fail_times: u32,
    }

    #[async_trait]
    impl McpTransport for FlakyTransport {
        async fn call(&self, _method: &str, _params: Option<Value>) -> Result<JsonRpcResponseAlias> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_times {
                return Err(Error::Timeout("not yet".into()));
            }
            Ok(JsonRpcResponseAlias { jsonrpc: "2.0".into(), id: "1".into(), result: Some(serde_json::json!("ok")), error: None })
        }
        async fn notify(&self, _method: &str) -> Result<()> {
            Ok(())
        }
        fn is_alive(&self) -> bool {
            true
        }
        async fn close(&self) {}
    }

    #[tokio::test]
    async fn retries_up_to_max_attempts_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let transport = FlakyTransport { calls: calls.clone(), fail_times: 2 };
        let retry = RetryTransport::new(
            transport,
            3,
            exponential_backoff(Duration::from_millis(1), Duration::from_millis(5)),
            default_retryable(),
        );
        let resp = retry.call("x", None).await.unwrap();
        assert_eq!(resp.id, "1");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let transport = FlakyTransport { calls: calls.clone(), fail_times: 10 };
        let retry = RetryTransport::new(
            transport,
            2,
            exponential_backoff(Duration::from_millis(1), Duration::from_millis(5)),
            default_retryable(),
        );
        assert!(retry.call("x", None).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn non_retryable_error_is_not_retried() {
        struct AlwaysValidationError;
        #[async_trait]
        impl McpTransport for AlwaysValidationError {
            async fn call(&self, _m: &str, _p: Option<Value>) -> Result<JsonRpcResponseAlias> {
                Err(Error::Validation("bad".into()))
            }
            async fn notify(&self, _m: &str) -> Result<()> {
                Ok(())
            }
            fn is_alive(&self) -> bool {
                true
            }
            async fn close(&self) {}
        }
        let retry = RetryTransport::new(
            AlwaysValidationError,
            5,
            exponential_backoff(Duration::from_millis(1), Duration::from_millis(5)),
            default_retryable(),
        );
        assert!(matches!(retry.call("x", None).await, Err(Error::Validation(_))));
    }
}
