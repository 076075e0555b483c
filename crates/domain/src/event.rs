use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::bookmark::EventBookmark;
use crate::error::Result;
use crate::message::ToolResult;

/// The three logical partitions an event type maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Progress,
    Control,
    Monitor,
}

/// Closed set of event types. Every variant maps to exactly one `Channel`;
/// this mapping is enforced by `EventType::channel`, not left to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Progress,
    Thinking,
    ToolCall,
    ToolResult,
    Completion,
    ApprovalReq,
    ApprovalResp,
    ApprovalRequested,
    ApprovalDecided,
    Interrupt,
    Resume,
    Metrics,
    Audit,
    Error,
}

impl EventType {
    pub fn channel(self) -> Channel {
        match self {
            EventType::Progress
            | EventType::Thinking
            | EventType::ToolCall
            | EventType::ToolResult
            | EventType::Completion => Channel::Progress,
            EventType::ApprovalReq
            | EventType::ApprovalResp
            | EventType::ApprovalRequested
            | EventType::ApprovalDecided
            | EventType::Interrupt
            | EventType::Resume => Channel::Control,
            EventType::Metrics | EventType::Audit | EventType::Error => Channel::Monitor,
        }
    }

    /// Types that, once emitted successfully, auto-seal the bus.
    pub fn auto_seals(self) -> bool {
        matches!(self, EventType::Completion | EventType::Error)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressData {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallData {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResultData {
    pub call_id: String,
    pub result: ToolResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionData {
    pub output: String,
    pub stop_reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub approval_id: String,
    pub command: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalResponse {
    pub approval_id: String,
    pub approved: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorData {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum EventData {
    Progress(ProgressData),
    ToolCall(ToolCallData),
    ToolResult(ToolResultData),
    Completion(CompletionData),
    ApprovalRequest(ApprovalRequest),
    ApprovalResponse(ApprovalResponse),
    Error(ErrorData),
    /// Events that carry no meaningful payload (interrupt/resume/audit/metrics
    /// whose content is fully described by `type` + a free-form JSON blob).
    Raw(serde_json::Value),
}

/// One typed event flowing through the bus/store/SSE stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub data: EventData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bookmark: Option<EventBookmark>,
}

impl Event {
    pub fn new(event_type: EventType, session_id: impl Into<String>, data: EventData) -> Self {
        Self {
            id: String::new(),
            event_type,
            timestamp: Utc::now(),
            session_id: session_id.into(),
            data,
            bookmark: None,
        }
    }

    /// Assigns `id`/`timestamp` if unset. Mirrors the WAL/Message "assigned
    /// if empty" convention.
    pub fn normalize(&mut self) {
        if self.id.is_empty() {
            self.id = random_id();
        }
    }

    pub fn channel(&self) -> Channel {
        self.event_type.channel()
    }
}

fn random_id() -> String {
    let mut bytes = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn validate_type(event_type: EventType) -> Result<Channel> {
    // Every `EventType` variant maps to a channel by construction, so this
    // can never actually fail — kept as a function so future additions to
    // the enum are forced to pass through one validation seam rather than
    // reaching into `.channel()` directly from call sites.
    Ok(event_type.channel())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_and_error_auto_seal() {
        assert!(EventType::Completion.auto_seals());
        assert!(EventType::Error.auto_seals());
        assert!(!EventType::Progress.auto_seals());
    }

    #[test]
    fn every_type_maps_to_one_channel() {
        assert_eq!(EventType::ToolCall.channel(), Channel::Progress);
        assert_eq!(EventType::ApprovalReq.channel(), Channel::Control);
        assert_eq!(EventType::Audit.channel(), Channel::Monitor);
    }

    #[test]
    fn normalize_assigns_id_once() {
        let mut ev = Event::new(
            EventType::Progress,
            "s1",
            EventData::Progress(ProgressData {
                message: "go".into(),
            }),
        );
        assert!(ev.id.is_empty());
        ev.normalize();
        assert_eq!(ev.id.len(), 24);
        let id = ev.id.clone();
        ev.normalize();
        assert_eq!(ev.id, id);
    }
}
