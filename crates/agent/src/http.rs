//! HTTP façade: `POST /api/run`, `GET /api/run/stream`, `GET /health`.
//!
//! This module wires just enough axum to exercise the orchestrator and
//! the SSE broadcast stream end to end; embedders are expected to mount
//! [`router`] into their own service rather than build routing on top of
//! it directly.

use std::collections::HashMap;
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{Bytes, Body};
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use agentsdk_domain::error::Result;
use agentsdk_domain::event::Event;
use agentsdk_domain::message::Message;
use agentsdk_domain::stream::Usage;
use agentsdk_events::{EventBus, EventBusOptions, EventSink, SseStream};
use agentsdk_model::Model;
use agentsdk_sessions::{Filter, MemorySession, Session};
use agentsdk_tools::ToolRegistry;

use crate::orchestrator::{Orchestrator, RunOptions};

/// Shared server state: the model and tool registry every run is driven
/// against, the options bounding a run, and the open session cache.
pub struct AppState {
    model: Arc<dyn Model>,
    registry: Arc<ToolRegistry>,
    run_options: RunOptions,
    heartbeat_interval: Duration,
    sessions_root: Option<PathBuf>,
    sessions: Arc<Mutex<HashMap<String, Arc<dyn Session>>>>,
}

impl Clone for AppState {
    fn clone(&self) -> Self {
        Self {
            model: self.model.clone(),
            registry: self.registry.clone(),
            run_options: self.run_options.clone(),
            heartbeat_interval: self.heartbeat_interval,
            sessions_root: self.sessions_root.clone(),
            sessions: self.sessions.clone(),
        }
    }
}

impl AppState {
    pub fn new(model: Arc<dyn Model>, registry: Arc<ToolRegistry>, run_options: RunOptions) -> Self {
        Self {
            model,
            registry,
            run_options,
            heartbeat_interval: Duration::from_secs(15),
            sessions_root: None,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Persist sessions as `FileSession`s rooted under `root` instead of
    /// the in-memory default.
    pub fn with_sessions_root(mut self, root: PathBuf) -> Self {
        self.sessions_root = Some(root);
        self
    }

    /// `0` disables heartbeats entirely.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    fn session(&self, id: &str) -> Result<Arc<dyn Session>> {
        let mut sessions = self.sessions.lock();
        if let Some(existing) = sessions.get(id) {
            return Ok(existing.clone());
        }
        let session: Arc<dyn Session> = match &self.sessions_root {
            Some(root) => Arc::new(agentsdk_sessions::FileSession::open(
                id,
                root.join(id),
                agentsdk_wal::WalOptions::default(),
            )?),
            None => Arc::new(MemorySession::new(id)),
        };
        sessions.insert(id.to_string(), session.clone());
        Ok(session)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/run", post(post_run))
        .route("/api/run/stream", get(get_run_stream))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "time": Utc::now().to_rfc3339(),
    }))
}

#[derive(Deserialize)]
struct RunRequestBody {
    input: Option<String>,
    session_id: Option<String>,
}

#[derive(Serialize)]
struct RunResponse {
    session_id: String,
    output: String,
    stop_reason: String,
    usage: Usage,
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(serde_json::json!({"error": message}))).into_response()
}

fn internal_error(err: impl std::fmt::Display) -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({"error": err.to_string()}))).into_response()
}

async fn post_run(State(state): State<AppState>, Json(body): Json<RunRequestBody>) -> Response {
    let Some(input) = body.input.filter(|s| !s.trim().is_empty()) else {
        return bad_request("missing input");
    };
    let session_id = body.session_id.unwrap_or_else(new_session_id);

    match run_once(&state, &session_id, input).await {
        Ok(result) => Json(RunResponse {
            session_id,
            output: result.output,
            stop_reason: result.stop_reason,
            usage: result.usage,
        })
        .into_response(),
        Err(e) => internal_error(e),
    }
}

async fn run_once(
    state: &AppState,
    session_id: &str,
    input: String,
) -> Result<crate::orchestrator::RunResult> {
    let session = state.session(session_id)?;
    session.append(Message::user(input))?;
    let transcript = session.list(&Filter::new())?;

    let orchestrator = Orchestrator::new(state.model.clone(), state.registry.clone());
    let result = orchestrator.run(session_id, transcript, &state.run_options).await?;

    session.append(Message::assistant(result.output.clone()))?;
    Ok(result)
}

#[derive(Deserialize)]
struct StreamParams {
    input: Option<String>,
    session_id: Option<String>,
}

/// Forwards bus events into an [`SseStream`], the glue between this one
/// HTTP request's scoped event bus and its broadcast stream.
struct SseSink(Arc<SseStream>);

impl EventSink for SseSink {
    fn forward(&self, event: Event) {
        if let Err(e) = self.0.send(&event) {
            tracing::warn!(error = %e, "failed to forward event onto sse stream");
        }
    }
}

async fn get_run_stream(State(state): State<AppState>, Query(params): Query<StreamParams>) -> Response {
    let Some(input) = params.input.filter(|s| !s.trim().is_empty()) else {
        return bad_request("missing input");
    };
    let session_id = params.session_id.unwrap_or_else(new_session_id);

    let session = match state.session(&session_id) {
        Ok(s) => s,
        Err(e) => return internal_error(e),
    };
    if let Err(e) = session.append(Message::user(input)) {
        return internal_error(e);
    }
    let transcript = match session.list(&Filter::new()) {
        Ok(t) => t,
        Err(e) => return internal_error(e),
    };

    let sse = Arc::new(SseStream::new(state.heartbeat_interval));
    let sink: Arc<dyn EventSink> = Arc::new(SseSink(sse.clone()));
    let bus = Arc::new(EventBus::new(
        Some(sink.clone()),
        Some(sink.clone()),
        Some(sink),
        EventBusOptions::default(),
    ));

    let subscriber = sse.attach();
    let sub_id = subscriber.id.clone();

    let orchestrator = Orchestrator::new(state.model.clone(), state.registry.clone()).with_event_bus(bus.clone());
    let options = state.run_options.clone();
    let sid = session_id.clone();
    let run_sse = sse.clone();

    tokio::spawn(async move {
        let outcome = orchestrator.run(&sid, transcript, &options).await;
        match outcome {
            Ok(result) => {
                if let Err(e) = session.append(Message::assistant(result.output)) {
                    tracing::warn!(error = %e, "failed to append streamed run result");
                }
            }
            Err(e) => tracing::warn!(error = %e, "streamed run failed"),
        }
        // Idempotent: Completion/Error events already auto-sealed the bus in
        // the common case; this covers max-iterations and watchdog exits.
        let _ = bus.seal().await;
        run_sse.send_complete();
        run_sse.detach(&sub_id);
    });

    let heartbeat = state.heartbeat_interval;
    let mut receiver = subscriber.receiver;

    let body_stream = async_stream::stream! {
        yield Ok::<_, Infallible>(Bytes::from_static(b": connected\n\n"));
        loop {
            if heartbeat.is_zero() {
                match receiver.recv().await {
                    Some(frame) => yield Ok(Bytes::from(frame)),
                    None => break,
                }
            } else {
                tokio::select! {
                    maybe = receiver.recv() => {
                        match maybe {
                            Some(frame) => yield Ok(Bytes::from(frame)),
                            None => break,
                        }
                    }
                    _ = tokio::time::sleep(heartbeat) => {
                        yield Ok(Bytes::from(SseStream::heartbeat_frame()));
                    }
                }
            }
        }
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .body(Body::from_stream(body_stream))
        .expect("static headers and a valid body stream never fail to build")
}

fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentsdk_model::{GenerateResponse, ScriptedModel};
    use axum::body::to_bytes;
    use tower::ServiceExt;

    fn state_with(responses: Vec<GenerateResponse>) -> AppState {
        let model = Arc::new(ScriptedModel::new("m", responses));
        let registry = Arc::new(ToolRegistry::new());
        AppState::new(model, registry, RunOptions::default())
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let app = router(state_with(vec![]));
        let response = app
            .oneshot(axum::http::Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn post_run_rejects_missing_input() {
        let app = router(state_with(vec![]));
        let response = app
            .oneshot(
                axum::http::Request::post("/api/run")
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn post_run_completes_without_tool_calls() {
        let app = router(state_with(vec![GenerateResponse {
            content: "hello back".into(),
            ..Default::default()
        }]));
        let response = app
            .oneshot(
                axum::http::Request::post("/api/run")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"input":"hi","session_id":"s1"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["output"], "hello back");
        assert_eq!(json["stop_reason"], "complete");
        assert_eq!(json["session_id"], "s1");
    }
}
