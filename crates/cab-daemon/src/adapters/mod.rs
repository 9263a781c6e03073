//! Per-assistant adapter strategies.
//!
//! An adapter knows how to build the assistant's command line, recognize
//! its hook payloads, map its native hook vocabulary onto the canonical
//! event kinds, parse its transcript records, and manage its on-disk hook
//! configuration.

pub mod claude;
pub mod codex;

use cab_core::error::{BridgeError, Result};
use cab_core::event::{ContentBlock, EventPayload};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A structured assistant turn parsed out of a transcript record.
#[derive(Debug, Clone, PartialEq)]
pub struct AssistantMessage {
    pub content: Vec<ContentBlock>,
    /// Provider request identifier, used for deduplication.
    pub request_id: Option<String>,
}

/// Strategy object for one assistant kind.
pub trait AgentAdapter: Send + Sync {
    /// Registered name (`"claude"`, `"codex"`).
    fn name(&self) -> &'static str;

    /// Human-readable name for logs and the doctor report.
    fn display_name(&self) -> &'static str;

    /// Build the shell-quoted command line typed into a fresh tmux session.
    fn build_command(&self, flags: &BTreeMap<String, String>) -> Result<String>;

    /// The adapter's native hook event names.
    fn hook_vocabulary(&self) -> &'static [&'static str];

    /// `true` when adapter-specific keys identify this payload.
    fn owns_payload(&self, payload: &Value) -> bool;

    /// Map a native hook into a canonical payload. `None` drops the record.
    fn parse_hook_event(&self, hook_name: &str, payload: &Value) -> Option<EventPayload>;

    /// Pull the assistant's own session identifier out of a payload.
    fn extract_session_id(&self, payload: &Value) -> Option<String>;

    /// Parse one transcript record into an assistant message, if this
    /// adapter has transcripts and the record is an assistant turn.
    fn parse_transcript_entry(&self, _entry: &Value) -> Option<AssistantMessage> {
        None
    }

    /// Location of the assistant's hook configuration file.
    fn settings_path(&self, home: &Path) -> PathBuf;

    /// Install the bridge hook into the assistant's settings. Idempotent:
    /// repeated installs leave exactly one bridge entry per hook event.
    fn install_hooks(&self, home: &Path, hook_script: &Path) -> anyhow::Result<()>;

    /// Remove all bridge hook entries from the assistant's settings.
    fn uninstall_hooks(&self, home: &Path) -> anyhow::Result<()>;

    /// Whether the assistant binary is on PATH.
    fn is_available(&self) -> bool;
}

/// Registry of adapters, consulted by the decoder, the transcript readers,
/// and the supervisor.
pub struct AdapterRegistry {
    adapters: Vec<Arc<dyn AgentAdapter>>,
}

impl AdapterRegistry {
    pub fn new(adapters: Vec<Arc<dyn AgentAdapter>>) -> Self {
        Self { adapters }
    }

    /// Registry with the built-in claude and codex adapters.
    pub fn with_builtins() -> Self {
        Self::new(vec![
            Arc::new(claude::ClaudeAdapter::default()),
            Arc::new(codex::CodexAdapter::default()),
        ])
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn AgentAdapter>> {
        self.adapters.iter().find(|a| a.name() == name).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn AgentAdapter>> {
        self.adapters.iter()
    }

    /// First adapter whose marker keys claim the payload.
    pub fn detect_by_payload(&self, payload: &Value) -> Option<Arc<dyn AgentAdapter>> {
        self.adapters
            .iter()
            .find(|a| a.owns_payload(payload))
            .cloned()
    }

    /// First adapter whose native vocabulary contains the hook name.
    pub fn detect_by_hook_name(&self, hook_name: &str) -> Option<Arc<dyn AgentAdapter>> {
        self.adapters
            .iter()
            .find(|a| a.hook_vocabulary().contains(&hook_name))
            .cloned()
    }
}

/// Validate a command-line flag key: alphanumeric with interior dashes,
/// never starting or ending with a dash.
pub fn validate_flag_key(key: &str) -> Result<()> {
    let bytes = key.as_bytes();
    let ok = !key.is_empty()
        && bytes[0].is_ascii_alphanumeric()
        && bytes[bytes.len() - 1].is_ascii_alphanumeric()
        && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    if ok {
        Ok(())
    } else {
        Err(BridgeError::InvalidFlagKey(key.to_string()))
    }
}

/// Single-quote a flag value for the shell, escaping embedded single
/// quotes as `'\''`. A single-quoted string is inert to every other shell
/// metacharacter, so this is the entire injection defense for values.
pub fn quote_flag_value(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        if c == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(c);
        }
    }
    quoted.push('\'');
    quoted
}

/// Assemble `<binary> --key 'value' ...` with validated keys and quoted
/// values. Flags are emitted in sorted key order for determinism.
pub fn build_flag_command(binary: &str, flags: &BTreeMap<String, String>) -> Result<String> {
    let mut command = binary.to_string();
    for (key, value) in flags {
        validate_flag_key(key)?;
        command.push_str(" --");
        command.push_str(key);
        command.push(' ');
        command.push_str(&quote_flag_value(value));
    }
    Ok(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── flag keys ─────────────────────────────────────────────────────────

    #[test]
    fn test_flag_key_accepts_alnum_and_interior_dashes() {
        assert!(validate_flag_key("model").is_ok());
        assert!(validate_flag_key("dangerously-skip-permissions").is_ok());
        assert!(validate_flag_key("a").is_ok());
        assert!(validate_flag_key("v2").is_ok());
    }

    #[test]
    fn test_flag_key_rejects_bad_shapes() {
        assert!(validate_flag_key("").is_err());
        assert!(validate_flag_key("-model").is_err());
        assert!(validate_flag_key("model-").is_err());
        assert!(validate_flag_key("mo del").is_err());
        assert!(validate_flag_key("mo;del").is_err());
        assert!(validate_flag_key("mo_del").is_err());
        assert!(validate_flag_key("$(evil)").is_err());
    }

    // ── value quoting ─────────────────────────────────────────────────────

    #[test]
    fn test_quote_plain_value() {
        assert_eq!(quote_flag_value("opus"), "'opus'");
    }

    #[test]
    fn test_quote_injection_attempt_stays_inert() {
        assert_eq!(
            quote_flag_value("x; touch /tmp/rce"),
            "'x; touch /tmp/rce'"
        );
        assert_eq!(quote_flag_value("$(whoami)"), "'$(whoami)'");
        assert_eq!(quote_flag_value("a|b&c"), "'a|b&c'");
        assert_eq!(quote_flag_value("line1\nline2"), "'line1\nline2'");
    }

    #[test]
    fn test_quote_embedded_single_quotes() {
        assert_eq!(quote_flag_value("it's"), r#"'it'\''s'"#);
        // A value that tries to break out of quoting gets each quote escaped.
        assert_eq!(
            quote_flag_value("'; touch /tmp/rce; '"),
            r#"''\''; touch /tmp/rce; '\'''"#
        );
    }

    // ── command assembly ──────────────────────────────────────────────────

    #[test]
    fn test_build_flag_command_sorted_and_quoted() {
        let mut flags = BTreeMap::new();
        flags.insert("model".to_string(), "x; touch /tmp/rce".to_string());
        flags.insert("cwd".to_string(), "/tmp/proj".to_string());
        let command = build_flag_command("claude", &flags).unwrap();
        assert_eq!(command, "claude --cwd '/tmp/proj' --model 'x; touch /tmp/rce'");
    }

    #[test]
    fn test_build_flag_command_invalid_key_fails_fast() {
        let mut flags = BTreeMap::new();
        flags.insert("-bad".to_string(), "v".to_string());
        let err = build_flag_command("codex", &flags).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidFlagKey(_)));
    }

    // ── registry ──────────────────────────────────────────────────────────

    #[test]
    fn test_builtin_registry_lookup() {
        let registry = AdapterRegistry::with_builtins();
        assert!(registry.get("claude").is_some());
        assert!(registry.get("codex").is_some());
        assert!(registry.get("gemini").is_none());
    }

    #[test]
    fn test_detect_by_hook_name() {
        let registry = AdapterRegistry::with_builtins();
        assert_eq!(
            registry.detect_by_hook_name("PreToolUse").unwrap().name(),
            "claude"
        );
        assert_eq!(
            registry
                .detect_by_hook_name("agent-turn-complete")
                .unwrap()
                .name(),
            "codex"
        );
        assert!(registry.detect_by_hook_name("NoSuchHook").is_none());
    }
}
