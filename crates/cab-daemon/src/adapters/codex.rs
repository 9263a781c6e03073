//! Codex adapter.
//!
//! Codex reports lifecycle through its `notify` mechanism with kebab-case
//! payload fields (`thread-id`, `turn-id`, `last-assistant-message`), though
//! relay scripts sometimes normalize to snake_case — both spellings are
//! accepted. There is no transcript file; the default `parse_transcript_entry`
//! (always `None`) applies. Hook configuration is a `notify` line in
//! `~/.codex/config.toml`.

use super::{build_flag_command, AgentAdapter};
use cab_core::error::Result;
use cab_core::event::EventPayload;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::claude::HOOK_MARKER;

const HOOK_EVENTS: &[&str] = &[
    "agent-turn-complete",
    "turn_complete",
    "tool_start",
    "tool_end",
    "session_start",
    "session_end",
    "notification",
];

#[derive(Debug, Default)]
pub struct CodexAdapter;

/// First present key wins; kebab- and snake-case spellings are aliases.
fn any_str(payload: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| payload.get(*k).and_then(Value::as_str))
        .map(str::to_string)
}

fn any_value(payload: &Value, keys: &[&str]) -> Option<Value> {
    keys.iter()
        .find_map(|k| payload.get(*k).filter(|v| !v.is_null()))
        .cloned()
}

impl AgentAdapter for CodexAdapter {
    fn name(&self) -> &'static str {
        "codex"
    }

    fn display_name(&self) -> &'static str {
        "Codex"
    }

    fn build_command(&self, flags: &BTreeMap<String, String>) -> Result<String> {
        build_flag_command("codex", flags)
    }

    fn hook_vocabulary(&self) -> &'static [&'static str] {
        HOOK_EVENTS
    }

    fn owns_payload(&self, payload: &Value) -> bool {
        ["thread_id", "thread-id", "turn_id", "turn-id"]
            .iter()
            .any(|k| payload.get(*k).is_some())
    }

    fn parse_hook_event(&self, hook_name: &str, payload: &Value) -> Option<EventPayload> {
        match hook_name {
            "tool_start" => Some(EventPayload::PreToolUse {
                tool: any_str(payload, &["tool", "tool_name"])?,
                tool_input: any_value(payload, &["input", "tool_input"]),
                tool_use_id: any_str(payload, &["call_id", "call-id"]),
            }),
            "tool_end" => Some(EventPayload::PostToolUse {
                tool: any_str(payload, &["tool", "tool_name"])?,
                tool_input: any_value(payload, &["input", "tool_input"]),
                tool_response: any_value(payload, &["output", "result"]),
                tool_use_id: any_str(payload, &["call_id", "call-id"]),
                success: payload
                    .get("success")
                    .and_then(Value::as_bool)
                    .unwrap_or_else(|| payload.get("error").is_none()),
                duration: payload
                    .get("duration_ms")
                    .or_else(|| payload.get("duration-ms"))
                    .and_then(Value::as_i64),
            }),
            "agent-turn-complete" | "turn_complete" => Some(EventPayload::Stop {
                stop_hook_active: false,
                response: any_str(
                    payload,
                    &["last-assistant-message", "last_assistant_message"],
                ),
            }),
            "session_start" => Some(EventPayload::SessionStart {
                source: any_str(payload, &["source"]),
                terminal: None,
            }),
            "session_end" => Some(EventPayload::SessionEnd),
            "notification" => Some(EventPayload::Notification {
                message: any_str(payload, &["message"]),
                level: any_str(payload, &["level"]),
            }),
            _ => None,
        }
    }

    fn extract_session_id(&self, payload: &Value) -> Option<String> {
        any_str(payload, &["thread_id", "thread-id", "session_id"])
    }

    fn settings_path(&self, home: &Path) -> PathBuf {
        home.join(".codex").join("config.toml")
    }

    fn install_hooks(&self, home: &Path, hook_script: &Path) -> anyhow::Result<()> {
        let path = self.settings_path(home);
        let existing = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };

        // Strip any previous bridge notify line, then put ours at the top of
        // the file where top-level keys are always legal (before the first
        // `[table]` header).
        let mut lines: Vec<&str> = existing
            .lines()
            .filter(|line| !line.contains(HOOK_MARKER))
            .collect();
        let notify_line = format!("notify = [\"{}\", \"codex\"]", hook_script.display());
        lines.insert(0, &notify_line);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, lines.join("\n") + "\n")?;
        Ok(())
    }

    fn uninstall_hooks(&self, home: &Path) -> anyhow::Result<()> {
        let path = self.settings_path(home);
        let existing = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let remaining: Vec<&str> = existing
            .lines()
            .filter(|line| !line.contains(HOOK_MARKER))
            .collect();
        std::fs::write(&path, remaining.join("\n") + "\n")?;
        Ok(())
    }

    fn is_available(&self) -> bool {
        which::which("codex").is_ok()
    }
}
