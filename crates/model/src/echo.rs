//! A trivial stand-in `Model` for the CLI/server binary. The CLI surface is
//! illustrative rather than the core of this workspace (concrete vendor
//! adapters are out of scope), so `agentctl` wires up this model by default:
//! it never calls a tool and returns the last user message verbatim.
//! Embedders link `agentsdk-model::Model` against their own provider.

use async_trait::async_trait;

use agentsdk_domain::error::Result;
use agentsdk_domain::message::Role;

use crate::traits::{GenerateRequest, GenerateResponse, Model};

pub struct EchoModel;

#[async_trait]
impl Model for EchoModel {
    async fn generate(&self, req: GenerateRequest) -> Result<GenerateResponse> {
        let last_user = req
            .transcript
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();

        Ok(GenerateResponse {
            content: format!("echo: {last_user}"),
            tool_calls: Vec::new(),
            usage: Default::default(),
            stop_reason: Some("complete".into()),
        })
    }

    fn name(&self) -> &str {
        "echo"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentsdk_domain::message::Message;

    #[tokio::test]
    async fn echoes_the_last_user_message() {
        let model = EchoModel;
        let req = GenerateRequest {
            transcript: vec![Message::user("hello"), Message::assistant("hi")],
            tools: vec![],
        };
        let resp = model.generate(req).await.unwrap();
        assert_eq!(resp.content, "echo: hello");
        assert!(resp.tool_calls.is_empty());
    }
}
