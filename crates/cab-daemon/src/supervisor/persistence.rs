//! Atomic snapshot persistence for `sessions.json`.
//!
//! Writes go to a temp file in the destination directory and land via
//! rename, so a reader never observes a partial snapshot.

use cab_core::error::{BridgeError, Result};
use cab_core::snapshot::BridgeSnapshot;
use std::io::Write;
use std::path::Path;
use tracing::debug;

/// Write the snapshot atomically.
pub fn save_snapshot(path: &Path, snapshot: &BridgeSnapshot) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| BridgeError::Persistence(format!("{} has no parent", path.display())))?;
    std::fs::create_dir_all(parent)
        .map_err(|e| BridgeError::Persistence(format!("create {}: {e}", parent.display())))?;

    let json = serde_json::to_vec_pretty(snapshot)
        .map_err(|e| BridgeError::Persistence(format!("serialize snapshot: {e}")))?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .map_err(|e| BridgeError::Persistence(format!("create temp file: {e}")))?;
    tmp.write_all(&json)
        .map_err(|e| BridgeError::Persistence(format!("write temp file: {e}")))?;
    tmp.persist(path)
        .map_err(|e| BridgeError::Persistence(format!("rename into {}: {e}", path.display())))?;

    debug!("Saved {} session(s) to {}", snapshot.sessions.len(), path.display());
    Ok(())
}

/// Load the snapshot, or `None` when no file exists yet.
pub fn load_snapshot(path: &Path) -> Result<Option<BridgeSnapshot>> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(BridgeError::Persistence(format!(
                "read {}: {e}",
                path.display()
            )))
        }
    };
    let snapshot = serde_json::from_str(&text)
        .map_err(|e| BridgeError::Persistence(format!("parse {}: {e}", path.display())))?;
    Ok(Some(snapshot))
}
