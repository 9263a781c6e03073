//! The session model — the unit of supervision.
//!
//! A session represents one interactive assistant process. `Internal`
//! sessions were spawned by the bridge into a bridge-owned tmux session;
//! `External` sessions were discovered from hook traffic and the bridge
//! only observes them (and can paste into their pane when the hook payload
//! told us where it lives).
//!
//! ## Status machine
//!
//! ```text
//!            session_start / user_prompt_submit / pre_tool_use
//!                 ┌──────────────────────────────────────┐
//!                 ▼                                      │
//!              working ── stop / subagent_stop ──▶ idle ─┘
//!                 │                                  ▲
//!   (inactivity timeout)────────────────────────────-┘
//!                 │
//!           session_end / tmux gone
//!                 ▼
//!              offline ── tmux back ──▶ idle
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Who owns the underlying process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    /// Spawned by the bridge into a bridge-owned tmux session.
    Internal,
    /// Discovered from hook traffic; the bridge never spawned it.
    External,
}

impl std::fmt::Display for SessionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Internal => write!(f, "internal"),
            Self::External => write!(f, "external"),
        }
    }
}

/// Activity status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// The assistant is processing a turn.
    Working,
    /// The assistant finished its turn and is waiting for input.
    Idle,
    /// The process is gone (tmux session absent or session_end received).
    Offline,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Working => write!(f, "working"),
            Self::Idle => write!(f, "idle"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

impl SessionStatus {
    /// Parse the lowercase wire form (used by the `status` list filter).
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "working" => Some(Self::Working),
            "idle" => Some(Self::Idle),
            "offline" => Some(Self::Offline),
            _ => None,
        }
    }
}

/// Where the assistant's terminal lives, when a hook payload told us.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalInfo {
    /// tmux pane id (e.g. `"%42"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pane_id: Option<String>,
    /// tmux server socket path, for assistants on a non-default server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket: Option<PathBuf>,
    /// Controlling tty device.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tty: Option<String>,
}

impl TerminalInfo {
    /// Returns `true` if no field is populated.
    pub fn is_empty(&self) -> bool {
        self.pane_id.is_none() && self.socket.is_none() && self.tty.is_none()
    }

    /// Returns `true` if the terminal is addressable for paste delivery.
    pub fn is_pasteable(&self) -> bool {
        self.pane_id.is_some() && self.socket.is_some()
    }
}

/// The unit of supervision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Bridge identity, used by the API.
    pub id: Uuid,
    /// Display name; defaults to the basename of `cwd`.
    pub name: String,
    pub kind: SessionKind,
    /// Registered adapter name (e.g. `"claude"`, `"codex"`).
    pub agent: String,
    pub status: SessionStatus,
    /// Absolute, symlink-resolved working directory.
    pub cwd: PathBuf,
    /// Epoch milliseconds.
    pub created_at: i64,
    /// Epoch milliseconds; bumped on every event touching this session.
    pub last_activity: i64,
    /// Bridge-owned tmux session name; set iff `kind == Internal`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tmux_session: Option<String>,
    /// Identifier the assistant reports in hook payloads. Set at most once
    /// for the session's life; `restart` explicitly clears it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_session_id: Option<String>,
    /// Tool currently executing; only ever set while `status == Working`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal: Option<TerminalInfo>,
    /// Path the assistant writes its transcript to; `None` for agents
    /// without transcripts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript_path: Option<PathBuf>,
}

impl Session {
    /// Bump the activity clock.
    pub fn touch(&mut self, now_ms: i64) {
        self.last_activity = now_ms;
    }
}
