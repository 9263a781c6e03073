//! Stable on-disk session snapshot (`sessions.json`).

use crate::session::Session;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The persistence record written atomically by the supervisor.
///
/// Layout is stable: `{ sessions, agentToManagedMap, sessionCounter }`. The
/// agent-to-managed map is persisted as a list of pairs so the ordering is
/// deterministic and the format survives map-implementation changes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeSnapshot {
    pub sessions: Vec<Session>,
    pub agent_to_managed_map: Vec<(String, Uuid)>,
    pub session_counter: u64,
}
