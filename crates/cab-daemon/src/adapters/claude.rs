//! Claude Code adapter.
//!
//! Claude's hooks POST JSON with PascalCase `hook_event_name`s and
//! snake_case fields (`tool_name`, `tool_input`, `session_id`, ...), and it
//! writes a JSONL transcript whose assistant turns carry an Anthropic
//! message body. Hook configuration lives in `~/.claude/settings.json`.

use super::{build_flag_command, AgentAdapter, AssistantMessage};
use cab_core::error::Result;
use cab_core::event::{ContentBlock, EventPayload};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Substring identifying bridge-owned hook entries in settings files.
pub const HOOK_MARKER: &str = "coding-agent-hook.sh";

const HOOK_EVENTS: &[&str] = &[
    "PreToolUse",
    "PostToolUse",
    "Stop",
    "SubagentStop",
    "SessionStart",
    "SessionEnd",
    "UserPromptSubmit",
    "Notification",
];

#[derive(Debug, Default)]
pub struct ClaudeAdapter;

impl ClaudeAdapter {
    fn parse_content_block(block: &Value) -> Option<ContentBlock> {
        match block.get("type")?.as_str()? {
            "text" => Some(ContentBlock::Text {
                text: block.get("text")?.as_str()?.to_string(),
            }),
            "thinking" => Some(ContentBlock::Thinking {
                text: block.get("thinking")?.as_str()?.to_string(),
            }),
            "tool_use" => Some(ContentBlock::ToolUse {
                tool_name: block.get("name")?.as_str()?.to_string(),
                tool_input: block.get("input").cloned().unwrap_or(Value::Null),
                tool_use_id: block
                    .get("id")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            }),
            _ => None,
        }
    }
}

fn opt_str(payload: &Value, key: &str) -> Option<String> {
    payload.get(key).and_then(Value::as_str).map(str::to_string)
}

fn opt_value(payload: &Value, key: &str) -> Option<Value> {
    payload.get(key).filter(|v| !v.is_null()).cloned()
}

/// Tool success: an explicit `success` flag on the response wins, then the
/// absence of an `error` field.
fn tool_success(payload: &Value) -> bool {
    if let Some(flag) = payload
        .get("tool_response")
        .and_then(|r| r.get("success"))
        .and_then(Value::as_bool)
    {
        return flag;
    }
    payload.get("error").is_none()
}

impl AgentAdapter for ClaudeAdapter {
    fn name(&self) -> &'static str {
        "claude"
    }

    fn display_name(&self) -> &'static str {
        "Claude Code"
    }

    fn build_command(&self, flags: &BTreeMap<String, String>) -> Result<String> {
        build_flag_command("claude", flags)
    }

    fn hook_vocabulary(&self) -> &'static [&'static str] {
        HOOK_EVENTS
    }

    fn owns_payload(&self, payload: &Value) -> bool {
        payload.get("claude_session_id").is_some()
            || opt_str(payload, "transcript_path")
                .is_some_and(|p| p.contains("/.claude/"))
    }

    fn parse_hook_event(&self, hook_name: &str, payload: &Value) -> Option<EventPayload> {
        match hook_name {
            "PreToolUse" => Some(EventPayload::PreToolUse {
                tool: opt_str(payload, "tool_name")?,
                tool_input: opt_value(payload, "tool_input"),
                tool_use_id: opt_str(payload, "tool_use_id"),
            }),
            "PostToolUse" => Some(EventPayload::PostToolUse {
                tool: opt_str(payload, "tool_name")?,
                tool_input: opt_value(payload, "tool_input"),
                tool_response: opt_value(payload, "tool_response"),
                tool_use_id: opt_str(payload, "tool_use_id"),
                success: tool_success(payload),
                duration: payload.get("duration_ms").and_then(Value::as_i64),
            }),
            "Stop" => Some(EventPayload::Stop {
                stop_hook_active: payload
                    .get("stop_hook_active")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
                response: opt_str(payload, "response"),
            }),
            "SubagentStop" => Some(EventPayload::SubagentStop),
            "SessionStart" => Some(EventPayload::SessionStart {
                source: opt_str(payload, "source"),
                terminal: None,
            }),
            "SessionEnd" => Some(EventPayload::SessionEnd),
            "UserPromptSubmit" => Some(EventPayload::UserPromptSubmit {
                prompt: opt_str(payload, "prompt"),
            }),
            "Notification" => Some(EventPayload::Notification {
                message: opt_str(payload, "message"),
                level: opt_str(payload, "level")
                    .or_else(|| opt_str(payload, "notification_type")),
            }),
            _ => None,
        }
    }

    fn extract_session_id(&self, payload: &Value) -> Option<String> {
        opt_str(payload, "claude_session_id").or_else(|| opt_str(payload, "session_id"))
    }

    fn parse_transcript_entry(&self, entry: &Value) -> Option<AssistantMessage> {
        if entry.get("type").and_then(Value::as_str) != Some("assistant") {
            return None;
        }
        let blocks = entry
            .get("message")?
            .get("content")?
            .as_array()?
            .iter()
            .filter_map(Self::parse_content_block)
            .collect();
        Some(AssistantMessage {
            content: blocks,
            request_id: opt_str(entry, "requestId"),
        })
    }

    fn settings_path(&self, home: &Path) -> PathBuf {
        home.join(".claude").join("settings.json")
    }

    fn install_hooks(&self, home: &Path, hook_script: &Path) -> anyhow::Result<()> {
        let path = self.settings_path(home);
        let mut settings = read_settings(&path)?;

        let hooks = settings
            .as_object_mut()
            .ok_or_else(|| anyhow::anyhow!("settings root is not an object"))?
            .entry("hooks")
            .or_insert_with(|| json!({}));
        let hooks = hooks
            .as_object_mut()
            .ok_or_else(|| anyhow::anyhow!("'hooks' is not an object"))?;

        for event in HOOK_EVENTS {
            let entries = hooks.entry(*event).or_insert_with(|| json!([]));
            let entries = entries
                .as_array_mut()
                .ok_or_else(|| anyhow::anyhow!("'hooks.{event}' is not an array"))?;
            entries.retain(|entry| !is_bridge_entry(entry));
            entries.push(json!({
                "matcher": "*",
                "hooks": [{
                    "type": "command",
                    "command": format!("{} claude {}", hook_script.display(), event),
                }],
            }));
        }

        write_settings(&path, &settings)
    }

    fn uninstall_hooks(&self, home: &Path) -> anyhow::Result<()> {
        let path = self.settings_path(home);
        if !path.exists() {
            return Ok(());
        }
        let mut settings = read_settings(&path)?;

        if let Some(hooks) = settings.get_mut("hooks").and_then(Value::as_object_mut) {
            for event in HOOK_EVENTS {
                if let Some(entries) = hooks.get_mut(*event).and_then(Value::as_array_mut) {
                    entries.retain(|entry| !is_bridge_entry(entry));
                }
            }
            hooks.retain(|_, v| v.as_array().is_none_or(|a| !a.is_empty()));
        }

        write_settings(&path, &settings)
    }

    fn is_available(&self) -> bool {
        which::which("claude").is_ok()
    }
}

fn read_settings(path: &Path) -> anyhow::Result<Value> {
    match std::fs::read_to_string(path) {
        Ok(text) if !text.trim().is_empty() => Ok(serde_json::from_str(&text)?),
        Ok(_) => Ok(json!({})),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(json!({})),
        Err(e) => Err(e.into()),
    }
}

fn write_settings(path: &Path, settings: &Value) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(settings)?)?;
    Ok(())
}

/// A settings entry belongs to the bridge when any of its commands mention
/// the hook script.
fn is_bridge_entry(entry: &Value) -> bool {
    entry
        .get("hooks")
        .and_then(Value::as_array)
        .is_some_and(|hooks| {
            hooks.iter().any(|h| {
                h.get("command")
                    .and_then(Value::as_str)
                    .is_some_and(|c| c.contains(HOOK_MARKER))
            })
        })
}
