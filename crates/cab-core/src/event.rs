//! Canonical, agent-agnostic event taxonomy.
//!
//! Adapters map their native hook vocabularies onto [`EventPayload`]; the
//! supervisor and the WebSocket broadcast only ever see these shapes. The
//! wire format is stable: `type` is the snake_case discriminant and extra
//! fields are camelCase.

use crate::session::TerminalInfo;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use uuid::Uuid;

/// Current time as epoch milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// One content block of an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Thinking { text: String },
    #[serde(rename_all = "camelCase")]
    ToolUse {
        tool_name: String,
        tool_input: Value,
        tool_use_id: Option<String>,
    },
}

/// Event-kind-specific fields, tagged by `type` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    #[serde(rename_all = "camelCase")]
    PreToolUse {
        tool: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_input: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_use_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    PostToolUse {
        tool: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_input: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_response: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_use_id: Option<String>,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration: Option<i64>,
    },
    #[serde(rename_all = "camelCase")]
    Stop {
        stop_hook_active: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        response: Option<String>,
    },
    SubagentStop,
    #[serde(rename_all = "camelCase")]
    SessionStart {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        terminal: Option<TerminalInfo>,
    },
    SessionEnd,
    #[serde(rename_all = "camelCase")]
    UserPromptSubmit {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prompt: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Notification {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        level: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    AssistantMessage {
        content: Vec<ContentBlock>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        is_preamble: bool,
    },
}

impl EventPayload {
    /// The wire discriminant for this payload.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PreToolUse { .. } => "pre_tool_use",
            Self::PostToolUse { .. } => "post_tool_use",
            Self::Stop { .. } => "stop",
            Self::SubagentStop => "subagent_stop",
            Self::SessionStart { .. } => "session_start",
            Self::SessionEnd => "session_end",
            Self::UserPromptSubmit { .. } => "user_prompt_submit",
            Self::Notification { .. } => "notification",
            Self::AssistantMessage { .. } => "assistant_message",
        }
    }
}

/// A fully-formed canonical event.
///
/// `session_id` is the bridge UUID, injected just before broadcast — events
/// flowing through the decoder pipeline carry only the agent's own id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentEvent {
    pub id: Uuid,
    pub timestamp: i64,
    #[serde(flatten)]
    pub payload: EventPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_session_id: Option<String>,
    pub agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
}

impl AgentEvent {
    /// Build a fresh event with a new id and the current timestamp.
    pub fn new(agent: &str, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: now_ms(),
            payload,
            session_id: None,
            agent_session_id: None,
            agent: agent.to_string(),
            cwd: None,
        }
    }
}

/// Decoder output: the canonical event plus routing metadata.
#[derive(Debug, Clone)]
pub struct ProcessedEvent {
    pub event: AgentEvent,
    /// Identifier the assistant reports for its own session.
    pub agent_session_id: String,
    pub agent: String,
    pub terminal: Option<TerminalInfo>,
    pub cwd: Option<PathBuf>,
    pub transcript_path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_wire_shape() {
        let payload = EventPayload::PreToolUse {
            tool: "Bash".to_string(),
            tool_input: Some(json!({"command": "ls"})),
            tool_use_id: Some("toolu_1".to_string()),
        };
        let event = AgentEvent::new("claude", payload);
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "pre_tool_use");
        assert_eq!(json["tool"], "Bash");
        assert_eq!(json["toolInput"]["command"], "ls");
        assert_eq!(json["toolUseId"], "toolu_1");
        assert_eq!(json["agent"], "claude");
        // sessionId is only injected on broadcast.
        assert!(json.get("sessionId").is_none());
    }

    #[test]
    fn test_unit_variants_serialize_with_type_only() {
        let event = AgentEvent::new("claude", EventPayload::SubagentStop);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "subagent_stop");

        let event = AgentEvent::new("claude", EventPayload::SessionEnd);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "session_end");
    }

    #[test]
    fn test_assistant_message_roundtrip() {
        let payload = EventPayload::AssistantMessage {
            content: vec![
                ContentBlock::Text {
                    text: "done".to_string(),
                },
                ContentBlock::ToolUse {
                    tool_name: "Edit".to_string(),
                    tool_input: json!({"file": "a.rs"}),
                    tool_use_id: None,
                },
            ],
            request_id: Some("req_7".to_string()),
            is_preamble: false,
        };
        let event = AgentEvent::new("claude", payload);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["content"][0]["type"], "text");
        assert_eq!(json["content"][1]["type"], "tool_use");
        assert_eq!(json["content"][1]["toolName"], "Edit");
        assert_eq!(json["requestId"], "req_7");
        assert_eq!(json["isPreamble"], false);

        let back: AgentEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_kind_matches_wire_discriminant() {
        let payload = EventPayload::Stop {
            stop_hook_active: false,
            response: None,
        };
        assert_eq!(payload.kind(), "stop");
        let json = serde_json::to_value(AgentEvent::new("codex", payload)).unwrap();
        assert_eq!(json["type"], "stop");
    }

    #[test]
    fn test_two_events_from_same_input_have_distinct_ids() {
        let a = AgentEvent::new("claude", EventPayload::SessionEnd);
        let b = AgentEvent::new("claude", EventPayload::SessionEnd);
        assert_ne!(a.id, b.id);
    }
}
