//! Exercises the HTTP façade end to end: a tool-calling turn through
//! `/api/run`, and a streamed turn through `/api/run/stream` whose SSE
//! frames are read back off the wire.

use std::sync::Arc;

use agentsdk_agent::{router, AppState, RunOptions};
use agentsdk_domain::error::Result;
use agentsdk_domain::message::{ToolCall, ToolDescriptor, ToolResult};
use agentsdk_model::{GenerateResponse, ScriptedModel};
use agentsdk_tools::{Tool, ToolRegistry};
use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

struct Upper;

#[async_trait]
impl Tool for Upper {
    fn name(&self) -> &str {
        "upper"
    }

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "upper".into(),
            description: "uppercases its `text` argument".into(),
            input_schema: serde_json::json!({"required": ["text"]}),
        }
    }

    async fn execute(&self, params: Value) -> Result<ToolResult> {
        let text = params.get("text").and_then(Value::as_str).unwrap_or_default();
        Ok(ToolResult::ok(text.to_uppercase()))
    }
}

#[tokio::test]
async fn post_run_drives_a_tool_call_then_completes() {
    let call = ToolCall { id: "1".into(), name: "upper".into(), arguments: Default::default() };
    let model = Arc::new(ScriptedModel::new(
        "scripted",
        vec![
            GenerateResponse { tool_calls: vec![call], ..Default::default() },
            GenerateResponse {
                content: "done".into(),
                stop_reason: Some("complete".into()),
                ..Default::default()
            },
        ],
    ));

    let registry = Arc::new(ToolRegistry::new());
    registry.register(Arc::new(Upper)).unwrap();

    let state = AppState::new(model, registry, RunOptions::default());
    let app = router(state);

    let response = app
        .oneshot(
            Request::post("/api/run")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"input":"shout hi","session_id":"s-tool"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["output"], "done");
    assert_eq!(json["stop_reason"], "complete");
}

#[tokio::test]
async fn stream_endpoint_frames_end_with_synthetic_complete() {
    let model = Arc::new(ScriptedModel::new(
        "scripted",
        vec![GenerateResponse {
            content: "streamed".into(),
            stop_reason: Some("complete".into()),
            ..Default::default()
        }],
    ));
    let registry = Arc::new(ToolRegistry::new());
    let state = AppState::new(model, registry, RunOptions::default());
    let app = router(state);

    let response = app
        .oneshot(
            Request::get("/api/run/stream?input=hi&session_id=s-stream")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/event-stream"
    );

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.starts_with(": connected\n\n"));
    assert!(text.contains("event: complete"));
}
