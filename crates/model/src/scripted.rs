//! An in-process `Model` that replays a canned sequence of responses.
//! Used by orchestrator tests that need deterministic turns without a real
//! provider.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;

use agentsdk_domain::error::{Error, Result};

use crate::traits::{GenerateRequest, GenerateResponse, Model};

pub struct ScriptedModel {
    name: String,
    responses: Mutex<VecDeque<GenerateResponse>>,
}

impl ScriptedModel {
    pub fn new(name: impl Into<String>, responses: Vec<GenerateResponse>) -> Self {
        Self {
            name: name.into(),
            responses: Mutex::new(responses.into()),
        }
    }
}

#[async_trait]
impl Model for ScriptedModel {
    async fn generate(&self, _req: GenerateRequest) -> Result<GenerateResponse> {
        self.responses
            .lock()
            .pop_front()
            .ok_or_else(|| Error::Other(format!("scripted model `{}` ran out of responses", self.name)))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
