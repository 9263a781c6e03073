//! Bridge configuration.
//!
//! All timing knobs carry the defaults from the supervisor design; the CLI
//! overrides host/port/data-dir via flags and everything else stays at its
//! default unless an env var says otherwise.

use crate::home::bridge_home;
use anyhow::Result;
use std::path::PathBuf;

/// Default HTTP listen port.
pub const DEFAULT_PORT: u16 = 4717;

/// Default HTTP listen host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Window after an internal session's creation during which a matching hook
/// event may adopt it (5 minutes).
pub const DEFAULT_LINKING_WINDOW_MS: i64 = 5 * 60 * 1000;

/// `working` sessions with no activity for this long drop to `idle`.
pub const DEFAULT_WORKING_TIMEOUT_MS: i64 = 2 * 60 * 1000;

/// Internal sessions `offline` for this long are deleted by cleanup.
pub const DEFAULT_OFFLINE_CLEANUP_MS: i64 = 60 * 60 * 1000;

/// Sessions untouched for this long are deleted by cleanup.
pub const DEFAULT_STALE_CLEANUP_MS: i64 = 24 * 60 * 60 * 1000;

/// Interval of the tmux-liveness health loop.
pub const TMUX_HEALTH_INTERVAL_MS: u64 = 10_000;

/// Interval of the working-timeout loop.
pub const WORKING_TIMEOUT_INTERVAL_MS: u64 = 10_000;

/// Interval of the stale-cleanup loop.
pub const CLEANUP_INTERVAL_MS: u64 = 60_000;

/// Interval of the write-behind persistence flush loop.
pub const FLUSH_INTERVAL_MS: u64 = 2_000;

/// Runtime configuration for the bridge daemon.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// HTTP listen host.
    pub host: String,
    /// HTTP listen port.
    pub port: u16,
    /// Bridge data root. Layout: `data/events.jsonl`, `data/sessions.json`,
    /// `hooks/coding-agent-hook.sh`.
    pub data_dir: PathBuf,
    /// Restrict hook decoding to a single adapter (None = all registered).
    pub agent_filter: Option<String>,
    /// Verbose logging (`--debug`); overrides `CAB_LOG`.
    pub debug: bool,
    /// Track sessions discovered from hook traffic (vs bridge-spawned only).
    pub track_external: bool,
    /// Linking window for adopting internal sessions, in ms.
    pub linking_window_ms: i64,
    /// Working → idle inactivity threshold, in ms.
    pub working_timeout_ms: i64,
    /// Offline internal session cleanup threshold, in ms.
    pub offline_cleanup_ms: i64,
    /// Untouched session cleanup threshold, in ms.
    pub stale_cleanup_ms: i64,
    /// Origin globs allowed for CORS and WebSocket upgrades.
    pub allowed_origins: Vec<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            data_dir: PathBuf::new(),
            agent_filter: None,
            debug: false,
            track_external: true,
            linking_window_ms: DEFAULT_LINKING_WINDOW_MS,
            working_timeout_ms: DEFAULT_WORKING_TIMEOUT_MS,
            offline_cleanup_ms: DEFAULT_OFFLINE_CLEANUP_MS,
            stale_cleanup_ms: DEFAULT_STALE_CLEANUP_MS,
            allowed_origins: default_origins(),
        }
    }
}

fn default_origins() -> Vec<String> {
    [
        "http://localhost:*",
        "https://localhost:*",
        "http://127.0.0.1:*",
        "https://127.0.0.1:*",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl BridgeConfig {
    /// Resolve a config with the default data directory under the bridge home.
    pub fn resolve() -> Result<Self> {
        let mut config = Self::default();
        config.data_dir = bridge_home()?;
        Ok(config)
    }

    /// Path to the persistent session snapshot.
    pub fn sessions_path(&self) -> PathBuf {
        self.data_dir.join("data").join("sessions.json")
    }

    /// Path to the append-only hook event log.
    pub fn events_path(&self) -> PathBuf {
        self.data_dir.join("data").join("events.jsonl")
    }

    /// Path to the installed hook relay script.
    pub fn hook_script_path(&self) -> PathBuf {
        self.data_dir.join("hooks").join("coding-agent-hook.sh")
    }

    /// Returns `true` if `origin` matches any configured glob.
    ///
    /// Globs support a single trailing-or-embedded `*` wildcard, which is all
    /// the origin patterns need (`http://localhost:*`).
    pub fn origin_allowed(&self, origin: &str) -> bool {
        self.allowed_origins
            .iter()
            .any(|glob| glob_match(glob, origin))
    }
}

fn glob_match(glob: &str, value: &str) -> bool {
    match glob.split_once('*') {
        None => glob == value,
        Some((prefix, suffix)) => {
            value.len() >= prefix.len() + suffix.len()
                && value.starts_with(prefix)
                && value.ends_with(suffix)
        }
    }
}
