//! The Run loop: model, tool calls, results, model — bounded by iteration
//! count, per-tool timeouts, and a whole-run watchdog.

use std::sync::Arc;
use std::time::Duration;

use agentsdk_domain::error::{Error, Result};
use agentsdk_domain::event::{
    CompletionData, ErrorData, Event, EventData, EventType, ProgressData, ToolCallData, ToolResultData,
};
use agentsdk_domain::message::{Message, ToolCall, ToolResult};
use agentsdk_domain::stream::Usage;
use agentsdk_events::EventBus;
use agentsdk_model::{GenerateRequest, Model};
use agentsdk_tools::ToolRegistry;

use crate::hooks::HookChain;

/// Tunables for one [`Orchestrator::run`] call.
#[derive(Clone)]
pub struct RunOptions {
    pub max_iterations: u32,
    pub tool_timeout: Duration,
    pub watchdog_timeout: Duration,
    pub enable_recovery: bool,
    /// `None` = every registered tool is callable; `Some(vec![])` = none;
    /// `Some(names)` = only those names.
    pub tool_whitelist: Option<Vec<String>>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_iterations: 25,
            tool_timeout: Duration::from_secs(30),
            watchdog_timeout: Duration::from_secs(300),
            enable_recovery: true,
            tool_whitelist: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunResult {
    pub output: String,
    pub stop_reason: String,
    pub usage: Usage,
}

pub struct Orchestrator {
    model: Arc<dyn Model>,
    registry: Arc<ToolRegistry>,
    hooks: HookChain,
    bus: Option<Arc<EventBus>>,
}

impl Orchestrator {
    pub fn new(model: Arc<dyn Model>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            model,
            registry,
            hooks: HookChain::new(),
            bus: None,
        }
    }

    pub fn with_hooks(mut self, hooks: HookChain) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub async fn run(
        &self,
        session_id: &str,
        mut transcript: Vec<Message>,
        options: &RunOptions,
    ) -> Result<RunResult> {
        let watchdog = tokio::time::sleep(options.watchdog_timeout);
        tokio::pin!(watchdog);

        let mut usage = Usage::default();
        let tool_defs = self.registry.descriptors();

        for iteration in 1..=options.max_iterations.max(1) {
            tracing::debug!(session_id, iteration, "orchestrator iteration starting");

            let gen_req = GenerateRequest { transcript: transcript.clone(), tools: tool_defs.clone() };
            self.hooks.before_model(&gen_req).await?;

            let resp = tokio::select! {
                biased;
                _ = &mut watchdog => {
                    let message = "run watchdog timeout exceeded".to_string();
                    self.emit(session_id, EventType::Error, EventData::Error(ErrorData { message })).await;
                    return Ok(RunResult { output: String::new(), stop_reason: "watchdog_timeout".into(), usage });
                }
                result = self.model.generate(gen_req) => result,
            };

            let resp = match resp {
                Ok(resp) => resp,
                Err(e) => {
                    self.hooks.on_error(&e).await;
                    return Err(e);
                }
            };
            self.hooks.after_model(&resp).await?;
            usage += resp.usage;

            self.emit(
                session_id,
                EventType::Thinking,
                EventData::Progress(ProgressData { message: resp.content.clone() }),
            )
            .await;

            if resp.tool_calls.is_empty() {
                transcript.push(Message::assistant(resp.content.clone()));
                self.emit(
                    session_id,
                    EventType::Completion,
                    EventData::Completion(CompletionData { output: resp.content.clone(), stop_reason: "complete".into() }),
                )
                .await;
                return Ok(RunResult { output: resp.content, stop_reason: "complete".into(), usage });
            }

            for call in &resp.tool_calls {
                if let Some(whitelist) = &options.tool_whitelist {
                    if !whitelist.iter().any(|name| name == &call.name) {
                        let result = ToolResult::failed(format!("tool `{}` is not in the whitelist", call.name));
                        self.emit_tool_result(session_id, call, &result).await;
                        transcript.push(tool_result_message(call, &result));
                        continue;
                    }
                }

                self.emit(
                    session_id,
                    EventType::ToolCall,
                    EventData::ToolCall(ToolCallData {
                        call_id: call.id.clone(),
                        tool_name: call.name.clone(),
                        arguments: serde_json::to_value(&call.arguments).unwrap_or(serde_json::Value::Null),
                    }),
                )
                .await;

                let outcome = match self.hooks.before_tool(call).await {
                    Ok(Some(short_circuited)) => ToolOutcome::Result(short_circuited),
                    Ok(None) => match self.run_tool(call, options).await {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            self.hooks.on_error(&e).await;
                            return Err(e);
                        }
                    },
                    Err(e) => {
                        self.hooks.on_error(&e).await;
                        ToolOutcome::Result(ToolResult::failed(e.to_string()))
                    }
                };

                match outcome {
                    ToolOutcome::Result(result) => {
                        self.hooks.after_tool(call, &result).await?;
                        self.emit_tool_result(session_id, call, &result).await;
                        transcript.push(tool_result_message(call, &result));
                    }
                    ToolOutcome::Recovered(result) => {
                        self.emit_tool_result(session_id, call, &result).await;
                        transcript.push(tool_result_message(call, &result));
                        let message = format!("recovered from a panic in tool `{}`", call.name);
                        transcript.push(Message::assistant(message.clone()));
                        self.emit(
                            session_id,
                            EventType::Completion,
                            EventData::Completion(CompletionData { output: message.clone(), stop_reason: "tool_error".into() }),
                        )
                        .await;
                        return Ok(RunResult { output: message, stop_reason: "tool_error".into(), usage });
                    }
                }
            }
        }

        Ok(RunResult { output: String::new(), stop_reason: "max_iterations".into(), usage })
    }

    async fn emit(&self, session_id: &str, event_type: EventType, data: EventData) {
        if let Some(bus) = &self.bus {
            let event = Event::new(event_type, session_id, data);
            if let Err(e) = bus.emit(event).await {
                tracing::warn!(error = %e, "failed to emit orchestrator event");
            }
        }
    }

    async fn emit_tool_result(&self, session_id: &str, call: &ToolCall, result: &ToolResult) {
        self.emit(
            session_id,
            EventType::ToolResult,
            EventData::ToolResult(ToolResultData { call_id: call.id.clone(), result: result.clone() }),
        )
        .await;
    }

    /// Runs one tool call under a timeout, isolated in its own task so a
    /// panic inside the tool doesn't take the orchestrator down with it.
    async fn run_tool(&self, call: &ToolCall, options: &RunOptions) -> Result<ToolOutcome> {
        let params = serde_json::to_value(&call.arguments).unwrap_or(serde_json::Value::Null);
        let registry = self.registry.clone();
        let name = call.name.clone();

        let handle = tokio::spawn(async move { registry.execute(&name, params).await });

        match tokio::time::timeout(options.tool_timeout, handle).await {
            Ok(Ok(Ok(result))) => Ok(ToolOutcome::Result(result)),
            Ok(Ok(Err(e))) => Ok(ToolOutcome::Result(ToolResult::failed(e.to_string()))),
            Ok(Err(join_err)) if join_err.is_panic() => {
                let result = ToolResult::failed(format!("tool `{}` panicked during execution", call.name));
                if options.enable_recovery {
                    Ok(ToolOutcome::Recovered(result))
                } else {
                    Err(Error::Other(format!("tool `{}` panicked and recovery is disabled", call.name)))
                }
            }
            Ok(Err(_canceled)) => Ok(ToolOutcome::Result(ToolResult::failed(format!("tool `{}` was cancelled", call.name)))),
            Err(_elapsed) => Ok(ToolOutcome::Result(ToolResult::failed(format!("tool `{}` timed out", call.name)))),
        }
    }
}

enum ToolOutcome {
    Result(ToolResult),
    Recovered(ToolResult),
}

fn tool_result_message(call: &ToolCall, result: &ToolResult) -> Message {
    let content = if result.success {
        result.output.clone()
    } else {
        result.error.clone().unwrap_or_else(|| "tool call failed".into())
    };
    let mut msg = Message::tool(content);
    msg.tool_calls = vec![call.clone()];
    msg
}
