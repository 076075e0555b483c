//! The provider-agnostic boundary the orchestrator drives against: one
//! `generate` call per turn, given the transcript and the tools currently
//! available to the model.

use async_trait::async_trait;

use agentsdk_domain::error::Result;
use agentsdk_domain::message::{Message, ToolCall, ToolDescriptor};
use agentsdk_domain::stream::Usage;

#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    pub transcript: Vec<Message>,
    pub tools: Vec<ToolDescriptor>,
}

/// What the model produced for one turn. `tool_calls` empty means the model
/// is done and the orchestrator should stop iterating.
#[derive(Debug, Clone, Default)]
pub struct GenerateResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Usage,
    pub stop_reason: Option<String>,
}

#[async_trait]
pub trait Model: Send + Sync {
    async fn generate(&self, req: GenerateRequest) -> Result<GenerateResponse>;

    /// Identifies this model instance, surfaced in logs and in
    /// `GenerateResponse`-adjacent reporting.
    fn name(&self) -> &str;
}
