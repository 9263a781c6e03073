//! Hook payload decoder.
//!
//! Normalizes arbitrary hook payloads — one JSON line from the event log
//! tailer or an HTTP POST body — into typed [`ProcessedEvent`]s. A payload
//! that cannot be attributed to an adapter, mapped to a canonical kind, and
//! given a session identifier is dropped (logged at debug, never an error:
//! a single bad record must not disturb the pipeline).

use crate::adapters::{AdapterRegistry, AgentAdapter};
use cab_core::event::{AgentEvent, ProcessedEvent};
use cab_core::session::TerminalInfo;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Keys consulted, in order, to resolve the native hook name.
const HOOK_NAME_KEYS: &[&str] = &["hook_event_name", "hook_type", "type", "event_type"];

pub struct HookDecoder {
    registry: Arc<AdapterRegistry>,
    /// When set, payloads from other adapters are dropped.
    agent_filter: Option<String>,
}

impl HookDecoder {
    pub fn new(registry: Arc<AdapterRegistry>, agent_filter: Option<String>) -> Self {
        Self {
            registry,
            agent_filter,
        }
    }

    /// Decode one raw JSONL record.
    pub fn decode_line(&self, line: &str) -> Option<ProcessedEvent> {
        let payload: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                debug!("Dropping malformed hook record: {e}");
                return None;
            }
        };
        self.decode(&payload)
    }

    /// Decode an already-parsed payload.
    pub fn decode(&self, payload: &Value) -> Option<ProcessedEvent> {
        if !payload.is_object() {
            debug!("Dropping non-object hook payload");
            return None;
        }

        let hook_name = resolve_hook_name(payload);
        let adapter = self.detect_adapter(payload, hook_name.as_deref())?;
        if let Some(filter) = &self.agent_filter {
            if adapter.name() != filter {
                debug!("Dropping {} payload (agent filter is '{filter}')", adapter.name());
                return None;
            }
        }

        let hook_name = hook_name?;
        let event_payload = adapter.parse_hook_event(&hook_name, payload)?;

        let agent_session_id = self.session_identifier(adapter.as_ref(), payload)?;
        let terminal = terminal_info(payload);
        let cwd = str_field(payload, "cwd")
            .or_else(|| str_field(payload, "working_directory"))
            .map(PathBuf::from);
        let transcript_path = str_field(payload, "transcript_path").map(PathBuf::from);

        let mut event = AgentEvent::new(adapter.name(), event_payload);
        event.agent_session_id = Some(agent_session_id.clone());
        event.cwd = cwd.as_ref().map(|p| p.to_string_lossy().into_owned());
        if let cab_core::event::EventPayload::SessionStart {
            terminal: event_terminal,
            ..
        } = &mut event.payload
        {
            if event_terminal.is_none() {
                event_terminal.clone_from(&terminal);
            }
        }

        Some(ProcessedEvent {
            event,
            agent_session_id,
            agent: adapter.name().to_string(),
            terminal,
            cwd,
            transcript_path,
        })
    }

    /// Agent detection, in order: explicit `agent` field, adapter marker
    /// keys, hook-name vocabulary, then tool-field shape.
    fn detect_adapter(
        &self,
        payload: &Value,
        hook_name: Option<&str>,
    ) -> Option<Arc<dyn AgentAdapter>> {
        if let Some(explicit) = str_field(payload, "agent") {
            if let Some(adapter) = self.registry.get(&explicit) {
                return Some(adapter);
            }
        }
        if let Some(adapter) = self.registry.detect_by_payload(payload) {
            return Some(adapter);
        }
        if let Some(name) = hook_name {
            if let Some(adapter) = self.registry.detect_by_hook_name(name) {
                return Some(adapter);
            }
        }
        // Shape of the tool fields: `tool_name` + `tool_input` reads like
        // Claude; `tool` + `input` reads like Codex.
        if payload.get("tool_name").is_some() && payload.get("tool_input").is_some() {
            if let Some(adapter) = self.registry.get("claude") {
                return Some(adapter);
            }
        }
        if payload.get("tool").is_some() && payload.get("input").is_some() {
            if let Some(adapter) = self.registry.get("codex") {
                return Some(adapter);
            }
        }
        debug!("Dropping hook payload: no adapter claims it");
        None
    }

    /// Session identifier fallback chain: adapter extraction, then the
    /// well-known keys, then synthesized terminal identities.
    fn session_identifier(&self, adapter: &dyn AgentAdapter, payload: &Value) -> Option<String> {
        if let Some(id) = adapter.extract_session_id(payload) {
            return Some(id);
        }
        if let Some(id) = str_field(payload, "claude_session_id") {
            return Some(id);
        }
        if let Some(id) = str_field(payload, "session_id") {
            return Some(id);
        }
        // Codex panes are stable enough to stand in for a session identity.
        if adapter.name() == "codex" {
            if let Some(pane) = str_field(payload, "tmux_pane") {
                return Some(format!("{}-{pane}", adapter.name()));
            }
        }
        if let Some(tty) = str_field(payload, "tty") {
            return Some(format!("{}-{tty}", adapter.name()));
        }
        debug!("Dropping {} payload: no session identifier", adapter.name());
        None
    }
}

fn resolve_hook_name(payload: &Value) -> Option<String> {
    HOOK_NAME_KEYS.iter().find_map(|k| str_field(payload, k))
}

fn str_field(payload: &Value, key: &str) -> Option<String> {
    payload.get(key).and_then(Value::as_str).map(str::to_string)
}

fn terminal_info(payload: &Value) -> Option<TerminalInfo> {
    let terminal = TerminalInfo {
        pane_id: str_field(payload, "tmux_pane"),
        socket: str_field(payload, "tmux_socket").map(PathBuf::from),
        tty: str_field(payload, "tty"),
    };
    if terminal.is_empty() {
        None
    } else {
        Some(terminal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cab_core::event::EventPayload;
    use serde_json::json;

    fn decoder() -> HookDecoder {
        HookDecoder::new(Arc::new(AdapterRegistry::with_builtins()), None)
    }

    #[test]
    fn test_malformed_json_dropped() {
        let d = decoder();
        assert!(d.decode_line("not json").is_none());
        assert!(d.decode_line("{broken").is_none());
        assert!(d.decode_line("[1,2,3]").is_none());
        assert!(d.decode_line("42").is_none());
    }

    #[test]
    fn test_claude_session_start_decodes() {
        let line = json!({
            "hook_event_name": "SessionStart",
            "session_id": "A",
            "cwd": "/tmp/proj",
            "transcript_path": "/home/u/.claude/projects/p/A.jsonl",
            "source": "startup",
        })
        .to_string();

        let processed = decoder().decode_line(&line).unwrap();
        assert_eq!(processed.agent, "claude");
        assert_eq!(processed.agent_session_id, "A");
        assert_eq!(processed.cwd.as_deref(), Some(std::path::Path::new("/tmp/proj")));
        assert!(processed.transcript_path.is_some());
        assert!(matches!(
            processed.event.payload,
            EventPayload::SessionStart { .. }
        ));
        assert_eq!(processed.event.agent_session_id.as_deref(), Some("A"));
    }

    #[test]
    fn test_codex_event_detected_by_explicit_agent() {
        let line = json!({
            "agent": "codex",
            "thread_id": "C",
            "cwd": "/tmp/proj",
            "event_type": "tool_start",
            "tool": "shell",
            "input": {"command": ["ls"]},
        })
        .to_string();

        let processed = decoder().decode_line(&line).unwrap();
        assert_eq!(processed.agent, "codex");
        assert_eq!(processed.agent_session_id, "C");
        assert!(matches!(
            processed.event.payload,
            EventPayload::PreToolUse { .. }
        ));
    }

    #[test]
    fn test_codex_detected_without_explicit_agent() {
        // No explicit agent, no marker keys — the hook vocabulary and the
        // tool/input shape both point at codex.
        let line = json!({
            "type": "tool_start",
            "tool": "shell",
            "input": {},
            "session_id": "s-9",
        })
        .to_string();
        let processed = decoder().decode_line(&line).unwrap();
        assert_eq!(processed.agent, "codex");
    }

    #[test]
    fn test_claude_detected_by_marker_key() {
        let line = json!({
            "hook_type": "Stop",
            "claude_session_id": "abc",
        })
        .to_string();
        let processed = decoder().decode_line(&line).unwrap();
        assert_eq!(processed.agent, "claude");
        assert!(matches!(processed.event.payload, EventPayload::Stop { .. }));
    }

    #[test]
    fn test_unattributable_payload_dropped() {
        let d = decoder();
        assert!(d
            .decode_line(&json!({"type": "mystery", "foo": 1}).to_string())
            .is_none());
    }

    #[test]
    fn test_missing_session_identifier_dropped() {
        // Claude Stop with no session id anywhere and no tty.
        let line = json!({"hook_event_name": "Stop", "claude_session_id": null, "transcript_path": "/home/u/.claude/p/x.jsonl"}).to_string();
        assert!(decoder().decode_line(&line).is_none());
    }

    #[test]
    fn test_codex_pane_identity_fallback() {
        let line = json!({
            "agent": "codex",
            "event_type": "agent-turn-complete",
            "tmux_pane": "%7",
        })
        .to_string();
        let processed = decoder().decode_line(&line).unwrap();
        assert_eq!(processed.agent_session_id, "codex-%7");
    }

    #[test]
    fn test_tty_identity_fallback() {
        let line = json!({
            "agent": "claude",
            "hook_event_name": "Stop",
            "tty": "/dev/ttys004",
        })
        .to_string();
        let processed = decoder().decode_line(&line).unwrap();
        assert_eq!(processed.agent_session_id, "claude-/dev/ttys004");
    }

    #[test]
    fn test_terminal_info_extraction() {
        let line = json!({
            "agent": "codex",
            "event_type": "session_start",
            "thread_id": "t",
            "tmux_pane": "%3",
            "tmux_socket": "/tmp/tmux-1000/default",
            "tty": "/dev/ttys001",
        })
        .to_string();
        let processed = decoder().decode_line(&line).unwrap();
        let terminal = processed.terminal.unwrap();
        assert_eq!(terminal.pane_id.as_deref(), Some("%3"));
        assert_eq!(
            terminal.socket.as_deref(),
            Some(std::path::Path::new("/tmp/tmux-1000/default"))
        );
        assert_eq!(terminal.tty.as_deref(), Some("/dev/ttys001"));
    }

    #[test]
    fn test_same_line_twice_gives_distinct_event_ids() {
        let d = decoder();
        let line = json!({
            "hook_event_name": "Stop",
            "session_id": "A",
        })
        .to_string();
        let first = d.decode_line(&line).unwrap();
        let second = d.decode_line(&line).unwrap();
        assert_eq!(first.event.payload.kind(), second.event.payload.kind());
        assert_eq!(first.agent, second.agent);
        assert_eq!(first.agent_session_id, second.agent_session_id);
        assert_ne!(first.event.id, second.event.id);
    }

    #[test]
    fn test_agent_filter_drops_other_adapters() {
        let d = HookDecoder::new(
            Arc::new(AdapterRegistry::with_builtins()),
            Some("claude".to_string()),
        );
        let codex = json!({"agent": "codex", "event_type": "session_end", "thread_id": "t"});
        assert!(d.decode(&codex).is_none());
        let claude = json!({"hook_event_name": "SessionEnd", "session_id": "A"});
        assert!(d.decode(&claude).is_some());
    }

    #[test]
    fn test_working_directory_fallback_key() {
        let line = json!({
            "hook_event_name": "Stop",
            "session_id": "A",
            "working_directory": "/tmp/elsewhere",
        })
        .to_string();
        let processed = decoder().decode_line(&line).unwrap();
        assert_eq!(
            processed.cwd.as_deref(),
            Some(std::path::Path::new("/tmp/elsewhere"))
        );
    }
}
