//! MCP transport layer: stdio subprocess and HTTP+SSE, both driven by a
//! [`PendingTracker`] so a single background reader can deliver responses to
//! whichever caller is waiting on their id.

use std::process::Stdio as ProcStdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin};
use tokio::sync::Mutex as AsyncMutex;

use agentsdk_domain::error::{Error, Result};

use crate::pending::PendingTracker;
use crate::protocol::{IdAllocator, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

/// Maximum number of non-JSON lines tolerated before declaring stdout dead.
/// MCP servers sometimes leak log lines onto stdout; anything starting with
/// `{` that still fails to decode is treated as a protocol violation instead.
const MAX_SKIP_LINES: usize = 1000;

/// A transport that can carry JSON-RPC calls to one MCP server.
#[async_trait]
pub trait McpTransport: Send + Sync {
    async fn call(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse>;
    async fn notify(&self, method: &str) -> Result<()>;
    fn is_alive(&self) -> bool;
    async fn close(&self);
}

pub struct StdioSpawnConfig<'a> {
    pub command: &'a str,
    pub args: &'a [String],
    pub env: &'a [(String, String)],
    pub cwd: Option<&'a str>,
    pub startup_timeout: Duration,
}

/// Stdio transport: communicates with a child process over stdin/stdout,
/// one newline-delimited JSON message per line.
pub struct StdioTransport {
    stdin: AsyncMutex<ChildStdin>,
    child: AsyncMutex<Child>,
    reader_handle: AsyncMutex<Option<tokio::task::JoinHandle<()>>>,
    tracker: Arc<PendingTracker>,
    ids: IdAllocator,
    alive: Arc<AtomicBool>,
}

impl StdioTransport {
    /// Spawn the child process and start the background reader. Fails if the
    /// process exits within `startup_timeout`.
    pub async fn spawn(config: StdioSpawnConfig<'_>) -> Result<Self> {
        let mut cmd = tokio::process::Command::new(config.command);
        cmd.args(config.args)
            .stdin(ProcStdio::piped())
            .stdout(ProcStdio::piped())
            .stderr(ProcStdio::piped());
        for (key, value) in config.env {
            cmd.env(key, value);
        }
        if let Some(cwd) = config.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd.spawn().map_err(Error::Io)?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Other("failed to capture child stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Other("failed to capture child stdout".into()))?;

        tokio::time::sleep(Duration::from_millis(20).min(config.startup_timeout)).await;
        if let Ok(Some(status)) = child.try_wait() {
            return Err(Error::Other(format!("MCP server exited during startup: {status}")));
        }

        let tracker = Arc::new(PendingTracker::new());
        let alive = Arc::new(AtomicBool::new(true));

        let reader_handle = tokio::spawn(Self::read_loop(
            BufReader::new(stdout),
            tracker.clone(),
            alive.clone(),
        ));

        Ok(Self {
            stdin: AsyncMutex::new(stdin),
            child: AsyncMutex::new(child),
            reader_handle: AsyncMutex::new(Some(reader_handle)),
            tracker,
            ids: IdAllocator::new(),
            alive,
        })
    }

    async fn read_loop(
        mut stdout: BufReader<tokio::process::ChildStdout>,
        tracker: Arc<PendingTracker>,
        alive: Arc<AtomicBool>,
    ) {
        let mut skipped = 0usize;
        loop {
            let mut line = String::new();
            let bytes_read = match stdout.read_line(&mut line).await {
                Ok(n) => n,
                Err(e) => {
                    tracing::warn!(error = %e, "MCP stdout read failed");
                    alive.store(false, Ordering::SeqCst);
                    tracker.fail_all(&Error::TransportClosed);
                    return;
                }
            };
            if bytes_read == 0 {
                alive.store(false, Ordering::SeqCst);
                tracker.fail_all(&Error::TransportClosed);
                return;
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if !trimmed.starts_with('{') {
                skipped += 1;
                if skipped >= MAX_SKIP_LINES {
                    alive.store(false, Ordering::SeqCst);
                    tracker.fail_all(&Error::Integrity("too many non-JSON lines on MCP stdout".into()));
                    return;
                }
                continue;
            }

            match serde_json::from_str::<JsonRpcResponse>(trimmed) {
                Ok(resp) => tracker.deliver(&resp.id.clone(), Ok(resp)),
                Err(e) => {
                    tracing::warn!(error = %e, "MCP stdout produced an undecodable frame");
                    alive.store(false, Ordering::SeqCst);
                    tracker.fail_all(&Error::Integrity(format!("undecodable MCP frame: {e}")));
                    return;
                }
            }
        }
    }

    async fn write_line(&self, json: &str) -> Result<()> {
        if !self.is_alive() {
            return Err(Error::TransportClosed);
        }
        let mut stdin = self.stdin.lock().await;
        stdin.write_all(json.as_bytes()).await.map_err(Error::Io)?;
        stdin.write_all(b"\n").await.map_err(Error::Io)?;
        stdin.flush().await.map_err(Error::Io)
    }
}

#[async_trait]
impl McpTransport for StdioTransport {
    async fn call(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse> {
        if !self.is_alive() {
            return Err(Error::TransportClosed);
        }
        let id = self.ids.next();
        let rx = self.tracker.add(&id)?;
        let req = JsonRpcRequest::new(id.clone(), method, params);
        let json = serde_json::to_string(&req).map_err(Error::Json)?;

        tracing::debug!(id = %id, method, "sending MCP request");
        if let Err(e) = self.write_line(&json).await {
            self.tracker.cancel(&id);
            return Err(e);
        }

        match tokio::time::timeout(Duration::from_secs(30), rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::TransportClosed),
            Err(_) => {
                self.tracker.cancel(&id);
                Err(Error::Timeout(format!("MCP call {method} timed out")))
            }
        }
    }

    async fn notify(&self, method: &str) -> Result<()> {
        let notif = JsonRpcNotification::new(method);
        let json = serde_json::to_string(&notif).map_err(Error::Json)?;
        self.write_line(&json).await
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.alive.store(false, Ordering::SeqCst);
        self.tracker.fail_all(&Error::TransportClosed);
        if let Some(handle) = self.reader_handle.lock().await.take() {
            handle.abort();
        }
        let mut child = self.child.lock().await;
        {
            let mut stdin = self.stdin.lock().await;
            let _ = stdin.shutdown().await;
        }
        match tokio::time::timeout(Duration::from_secs(5), child.wait()).await {
            Ok(Ok(status)) => tracing::debug!(?status, "MCP server process exited"),
            Ok(Err(e)) => tracing::warn!(error = %e, "error waiting for MCP server process"),
            Err(_) => {
                tracing::warn!("MCP server did not exit in time, killing");
                let _ = child.kill().await;
            }
        }
    }
}

/// Configuration for an [`SseTransport`]: a base URL from which `/events`
/// and `/rpc` are derived.
pub struct SseConfig {
    pub base_url: String,
    pub heartbeat_interval: Duration,
    pub reconnect_initial: Duration,
    pub reconnect_max: Duration,
}

/// HTTP + SSE transport. The read loop holds a long-lived GET to `/events`,
/// parsing `data:` frames as JSON-RPC responses; `Call` POSTs to `/rpc` and
/// waits for its response to arrive via the same pending tracker the read
/// loop delivers into. A watchdog reconnects the event stream if heartbeats
/// stop arriving.
pub struct SseTransport {
    client: reqwest::Client,
    events_url: String,
    rpc_url: String,
    tracker: Arc<PendingTracker>,
    ids: IdAllocator,
    alive: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
    reader_handle: AsyncMutex<Option<tokio::task::JoinHandle<()>>>,
    watchdog_handle: AsyncMutex<Option<tokio::task::JoinHandle<()>>>,
    last_heartbeat: Arc<std::sync::atomic::AtomicI64>,
    force_reconnect: Arc<AtomicBool>,
}

impl SseTransport {
    pub fn events_url(&self) -> &str {
        &self.events_url
    }

    pub fn connect(config: SseConfig) -> Result<Self> {
        let base = config.base_url.trim_end_matches('/');
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Other(format!("failed to build HTTP client: {e}")))?;

        let tracker = Arc::new(PendingTracker::new());
        let alive = Arc::new(AtomicBool::new(true));
        let connected = Arc::new(AtomicBool::new(false));
        let last_heartbeat = Arc::new(std::sync::atomic::AtomicI64::new(now_millis()));
        let force_reconnect = Arc::new(AtomicBool::new(false));

        let reader_handle = tokio::spawn(Self::read_loop(
            client.clone(),
            format!("{base}/events"),
            tracker.clone(),
            alive.clone(),
            connected.clone(),
            last_heartbeat.clone(),
            force_reconnect.clone(),
            config.reconnect_initial,
            config.reconnect_max,
        ));

        let watchdog_handle = tokio::spawn(Self::watchdog(
            alive.clone(),
            last_heartbeat.clone(),
            force_reconnect.clone(),
            config.heartbeat_interval,
        ));

        Ok(Self {
            client,
            events_url: format!("{base}/events"),
            rpc_url: format!("{base}/rpc"),
            tracker,
            ids: IdAllocator::new(),
            alive,
            connected,
            reader_handle: AsyncMutex::new(Some(reader_handle)),
            watchdog_handle: AsyncMutex::new(Some(watchdog_handle)),
            last_heartbeat,
            force_reconnect,
        })
    }

    /// Watches for a stale heartbeat and, when one is found, flips
    /// `force_reconnect` so the read loop tears down its current connection
    /// and reconnects from scratch instead of trusting a half-dead stream.
    async fn watchdog(
        alive: Arc<AtomicBool>,
        last_heartbeat: Arc<std::sync::atomic::AtomicI64>,
        force_reconnect: Arc<AtomicBool>,
        interval: Duration,
    ) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if !alive.load(Ordering::SeqCst) {
                return;
            }
            let age_ms = now_millis() - last_heartbeat.load(Ordering::SeqCst);
            if age_ms > interval.as_millis() as i64 {
                tracing::warn!(age_ms, "MCP SSE heartbeat stale, forcing reconnect");
                force_reconnect.store(true, Ordering::SeqCst);
                last_heartbeat.store(now_millis(), Ordering::SeqCst);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn read_loop(
        client: reqwest::Client,
        events_url: String,
        tracker: Arc<PendingTracker>,
        alive: Arc<AtomicBool>,
        connected: Arc<AtomicBool>,
        last_heartbeat: Arc<std::sync::atomic::AtomicI64>,
        force_reconnect: Arc<AtomicBool>,
        reconnect_initial: Duration,
        reconnect_max: Duration,
    ) {
        let mut backoff = reconnect_initial;
        while alive.load(Ordering::SeqCst) {
            force_reconnect.store(false, Ordering::SeqCst);
            match client.get(&events_url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    backoff = reconnect_initial;
                    connected.store(true, Ordering::SeqCst);
                    if let Err(e) =
                        Self::pump_events(resp, &tracker, &last_heartbeat, &alive, &force_reconnect).await
                    {
                        tracing::warn!(error = %e, "MCP SSE stream ended");
                    }
                }
                Ok(resp) => {
                    tracing::warn!(status = %resp.status(), "MCP events endpoint returned non-2xx");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to connect to MCP events endpoint");
                }
            }

            if !alive.load(Ordering::SeqCst) {
                break;
            }
            connected.store(false, Ordering::SeqCst);
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(reconnect_max);
        }
        tracker.fail_all(&Error::TransportClosed);
    }

    async fn pump_events(
        resp: reqwest::Response,
        tracker: &Arc<PendingTracker>,
        last_heartbeat: &Arc<std::sync::atomic::AtomicI64>,
        alive: &Arc<AtomicBool>,
        force_reconnect: &Arc<AtomicBool>,
    ) -> Result<()> {
        use futures_util::StreamExt;

        let mut stream = resp.bytes_stream();
        let mut buf = String::new();
        while let Some(chunk) = stream.next().await {
            if !alive.load(Ordering::SeqCst) {
                return Ok(());
            }
            if force_reconnect.load(Ordering::SeqCst) {
                tracing::debug!("tearing down MCP SSE stream for forced reconnect");
                return Ok(());
            }
            let chunk = chunk.map_err(|e| Error::Other(format!("MCP SSE read error: {e}")))?;
            buf.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(pos) = buf.find("\n\n") {
                let frame = buf[..pos].to_string();
                buf.drain(..pos + 2);
                Self::handle_frame(&frame, tracker, last_heartbeat);
            }
        }
        Ok(())
    }

    fn handle_frame(frame: &str, tracker: &Arc<PendingTracker>, last_heartbeat: &Arc<std::sync::atomic::AtomicI64>) {
        let mut event = "message";
        let mut data = String::new();
        for line in frame.lines() {
            if let Some(rest) = line.strip_prefix("event:") {
                event = rest.trim();
            } else if let Some(rest) = line.strip_prefix("data:") {
                data.push_str(rest.trim());
            }
        }

        if event == "heartbeat" {
            last_heartbeat.store(now_millis(), Ordering::SeqCst);
            return;
        }
        if data.is_empty() {
            return;
        }
        match serde_json::from_str::<JsonRpcResponse>(&data) {
            Ok(resp) => tracker.deliver(&resp.id.clone(), Ok(resp)),
            Err(e) => tracing::warn!(error = %e, "undecodable MCP SSE frame"),
        }
    }
}

#[async_trait]
impl McpTransport for SseTransport {
    async fn call(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        while !self.connected.load(Ordering::SeqCst) {
            if !self.alive.load(Ordering::SeqCst) {
                return Err(Error::TransportClosed);
            }
            if tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let id = self.ids.next();
        let rx = self.tracker.add(&id)?;
        let req = JsonRpcRequest::new(id.clone(), method, params);

        let resp = self
            .client
            .post(&self.rpc_url)
            .json(&req)
            .send()
            .await
            .map_err(|e| Error::Other(format!("MCP rpc post failed: {e}")))?;

        if !resp.status().is_success() {
            self.tracker.cancel(&id);
            return Err(Error::Other(format!("rpc status {}", resp.status())));
        }

        match tokio::time::timeout(Duration::from_secs(30), rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::TransportClosed),
            Err(_) => {
                self.tracker.cancel(&id);
                Err(Error::Timeout(format!("MCP call {method} timed out")))
            }
        }
    }

    async fn notify(&self, method: &str) -> Result<()> {
        let notif = JsonRpcNotification::new(method);
        let resp = self
            .client
            .post(&self.rpc_url)
            .json(&notif)
            .send()
            .await
            .map_err(|e| Error::Other(format!("MCP rpc post failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(Error::Other(format!("rpc status {}", resp.status())));
        }
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.alive.store(false, Ordering::SeqCst);
        self.tracker.fail_all(&Error::TransportClosed);
        if let Some(handle) = self.reader_handle.lock().await.take() {
            handle.abort();
        }
        if let Some(handle) = self.watchdog_handle.lock().await.take() {
            handle.abort();
        }
    }
}

fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stdio_round_trip_echo() {
        // A tiny shell script that echoes back each request with a canned
        // result, simulating the simplest possible MCP server over stdio.
        let script = r#"
while IFS= read -r line; do
  id=$(echo "$line" | sed -n 's/.*"id":"\([^"]*\)".*/\1/p')
  printf '{"jsonrpc":"2.0","id":"%s","result":{"echo":true}}\n' "$id"
done
"#;
        let transport = StdioTransport::spawn(StdioSpawnConfig {
            command: "sh",
            args: &["-c".to_string(), script.to_string()],
            env: &[],
            cwd: None,
            startup_timeout: Duration::from_millis(200),
        })
        .await
        .unwrap();

        let resp = transport.call("ping", None).await.unwrap();
        assert!(resp.result.unwrap().get("echo").is_some());
        transport.close().await;
    }

    #[tokio::test]
    async fn stdio_startup_failure_is_reported() {
        let result = StdioTransport::spawn(StdioSpawnConfig {
            command: "sh",
            args: &["-c".to_string(), "exit 1".to_string()],
            env: &[],
            cwd: None,
            startup_timeout: Duration::from_millis(100),
        })
        .await;
        assert!(result.is_err());
    }
}
