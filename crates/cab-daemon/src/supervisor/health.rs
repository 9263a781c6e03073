//! Supervisor background loops.
//!
//! Four periodic loops, all cancelled together through one token:
//! tmux-liveness (10 s), working-timeout (10 s), stale cleanup (60 s), and
//! the write-behind persistence flush (2 s).

use super::SessionSupervisor;
use cab_core::config::{
    CLEANUP_INTERVAL_MS, FLUSH_INTERVAL_MS, TMUX_HEALTH_INTERVAL_MS, WORKING_TIMEOUT_INTERVAL_MS,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub(super) fn spawn_loops(
    supervisor: Arc<SessionSupervisor>,
    cancel: CancellationToken,
) -> Vec<JoinHandle<()>> {
    let tmux = {
        let supervisor = Arc::clone(&supervisor);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_millis(TMUX_HEALTH_INTERVAL_MS));
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tick.tick() => supervisor.check_tmux_health().await,
                }
            }
            debug!("tmux health loop stopped");
        })
    };

    let working = {
        let supervisor = Arc::clone(&supervisor);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let mut tick =
                tokio::time::interval(Duration::from_millis(WORKING_TIMEOUT_INTERVAL_MS));
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tick.tick() => supervisor.check_working_timeout(),
                }
            }
            debug!("working timeout loop stopped");
        })
    };

    let cleanup = {
        let supervisor = Arc::clone(&supervisor);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_millis(CLEANUP_INTERVAL_MS));
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tick.tick() => supervisor.run_cleanup().await,
                }
            }
            debug!("cleanup loop stopped");
        })
    };

    let flush = {
        let supervisor = Arc::clone(&supervisor);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_millis(FLUSH_INTERVAL_MS));
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tick.tick() => {
                        // save() is a no-op while clean; failures are
                        // surfaced on the error signal and retried.
                        let _ = supervisor.save();
                    }
                }
            }
            debug!("flush loop stopped");
        })
    };

    vec![tmux, working, cleanup, flush]
}
