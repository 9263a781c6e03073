//! Process-level tracing setup.
//!
//! The subscriber is installed once per process; every CLI subcommand and
//! test can call [`init`] unconditionally. The level comes from the bridge
//! config so `--debug` and `CAB_LOG` resolve in one place.

use crate::config::BridgeConfig;
use std::sync::atomic::{AtomicBool, Ordering};

static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Resolve the log level for a run: the `--debug` flag wins, then
/// `CAB_LOG` (any spelling `tracing::Level` accepts), then info.
pub fn level_for(config: &BridgeConfig) -> tracing::Level {
    if config.debug {
        return tracing::Level::DEBUG;
    }
    std::env::var("CAB_LOG")
        .ok()
        .and_then(|value| value.trim().parse::<tracing::Level>().ok())
        .unwrap_or(tracing::Level::INFO)
}

/// Install the global subscriber. Later calls are no-ops, and a subscriber
/// installed elsewhere (e.g. by a test harness) is left in place.
pub fn init(config: &BridgeConfig) {
    if INSTALLED.swap(true, Ordering::SeqCst) {
        return;
    }
    let _ = tracing_subscriber::fmt()
        .with_max_level(level_for(config))
        .with_target(false)
        .try_init();
}
