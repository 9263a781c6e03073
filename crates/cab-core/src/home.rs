//! Canonical home directory resolution for the bridge.
//!
//! All crates resolve the bridge home through this module so behavior is
//! identical everywhere and overridable for tests and custom deployments.
//!
//! # Precedence
//!
//! 1. `CAB_HOME` environment variable (if set and non-empty)
//! 2. `dirs::home_dir()` platform default, joined with `.cab`
//!
//! Integration tests MUST set `CAB_HOME` to a tempdir so they never touch
//! the real user home.

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Resolve the bridge data root.
///
/// Returns `$CAB_HOME` when set and non-empty, otherwise `~/.cab`.
pub fn bridge_home() -> Result<PathBuf> {
    if let Ok(custom) = std::env::var("CAB_HOME") {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            return Ok(PathBuf::from(trimmed));
        }
    }

    let home = dirs::home_dir().context("failed to determine home directory")?;
    Ok(home.join(".cab"))
}

/// Resolve the host user's home directory (for adapter settings files).
///
/// Honors `CAB_USER_HOME` for tests, then falls back to the platform home.
pub fn user_home() -> Result<PathBuf> {
    if let Ok(custom) = std::env::var("CAB_USER_HOME") {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            return Ok(PathBuf::from(trimmed));
        }
    }

    dirs::home_dir().context("failed to determine home directory")
}
