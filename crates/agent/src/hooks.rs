//! Ordered interceptors around the four seams a Run passes through:
//! before/after a model call, before/after a tool call, and on error.
//! Replaces a single fixed exec-approval check with an ordered list any
//! number of policies can hook into.

use async_trait::async_trait;

use agentsdk_domain::error::{Error, Result};
use agentsdk_domain::message::{ToolCall, ToolResult};
use agentsdk_model::{GenerateRequest, GenerateResponse};

#[async_trait]
pub trait Hook: Send + Sync {
    async fn before_model(&self, _req: &GenerateRequest) -> Result<()> {
        Ok(())
    }

    async fn after_model(&self, _resp: &GenerateResponse) -> Result<()> {
        Ok(())
    }

    /// Returning `Some(result)` short-circuits the call: the tool never
    /// runs and `result` is used as if it had.
    async fn before_tool(&self, _call: &ToolCall) -> Result<Option<ToolResult>> {
        Ok(None)
    }

    async fn after_tool(&self, _call: &ToolCall, _result: &ToolResult) -> Result<()> {
        Ok(())
    }

    async fn on_error(&self, _error: &Error) {}
}

/// An ordered list of hooks, invoked front-to-back at each seam.
#[derive(Default)]
pub struct HookChain {
    hooks: Vec<Box<dyn Hook>>,
}

impl HookChain {
    pub fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    pub fn push(&mut self, hook: Box<dyn Hook>) {
        self.hooks.push(hook);
    }

    pub async fn before_model(&self, req: &GenerateRequest) -> Result<()> {
        for hook in &self.hooks {
            hook.before_model(req).await?;
        }
        Ok(())
    }

    pub async fn after_model(&self, resp: &GenerateResponse) -> Result<()> {
        for hook in &self.hooks {
            hook.after_model(resp).await?;
        }
        Ok(())
    }

    /// Returns the first short-circuit result produced, stopping at that
    /// hook; later hooks do not see the call.
    pub async fn before_tool(&self, call: &ToolCall) -> Result<Option<ToolResult>> {
        for hook in &self.hooks {
            if let Some(result) = hook.before_tool(call).await? {
                return Ok(Some(result));
            }
        }
        Ok(None)
    }

    pub async fn after_tool(&self, call: &ToolCall, result: &ToolResult) -> Result<()> {
        for hook in &self.hooks {
            hook.after_tool(call, result).await?;
        }
        Ok(())
    }

    pub async fn on_error(&self, error: &Error) {
        for hook in &self.hooks {
            hook.on_error(error).await;
        }
    }
}
