//! Session supervisor daemon for the coding agent bridge.
//!
//! Reconciles three asynchronous streams — bridge-spawned tmux processes,
//! out-of-band hook callbacks from assistants, and per-assistant transcript
//! files — into one coherent model of sessions, exposed over HTTP and
//! WebSocket.
//!
//! Wiring (leaves first): [`tmux::TmuxDriver`] is driven by the supervisor;
//! [`tailer::LineTailer`] feeds [`hooks::HookDecoder`], whose output lands in
//! [`supervisor::SessionSupervisor`]; per-session [`transcript`] readers feed
//! the supervisor independently; [`api`] broadcasts everything.

pub mod adapters;
pub mod api;
pub mod hooks;
pub mod spawn;
pub mod supervisor;
pub mod tailer;
pub mod tmux;
pub mod transcript;

use anyhow::{Context, Result};
use cab_core::BridgeConfig;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Run the bridge daemon until the cancellation token fires.
///
/// Wires the full pipeline: loads persisted sessions, starts the supervisor
/// health loops, tails the hook event log, and serves the HTTP/WebSocket API.
pub async fn run(config: BridgeConfig, cancel: CancellationToken) -> Result<()> {
    std::fs::create_dir_all(config.data_dir.join("data"))
        .with_context(|| format!("failed to create data dir under {}", config.data_dir.display()))?;

    let tmux = Arc::new(tmux::TmuxDriver::new());
    let registry = Arc::new(adapters::AdapterRegistry::with_builtins());
    let decoder = Arc::new(hooks::HookDecoder::new(
        Arc::clone(&registry),
        config.agent_filter.clone(),
    ));

    let supervisor = supervisor::SessionSupervisor::new(config.clone(), tmux, Arc::clone(&registry));
    if let Err(e) = supervisor.load() {
        warn!("Failed to load persisted sessions, starting empty: {e}");
    }
    supervisor.start(cancel.clone());

    // Hook intake: tail events.jsonl and pump decoded events into the
    // supervisor. The tailer survives the file not existing yet.
    let events_path = config.events_path();
    let (line_tx, mut line_rx) = tokio::sync::mpsc::channel::<tailer::TailEvent>(256);
    let tail_cancel = cancel.clone();
    let tailer = tailer::LineTailer::new(events_path, tailer::TailerOptions::default());
    let tail_task = tokio::spawn(async move {
        tailer.run(line_tx, tail_cancel).await;
    });

    let pump_supervisor = Arc::clone(&supervisor);
    let pump_decoder = Arc::clone(&decoder);
    let pump_cancel = cancel.clone();
    let pump_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = pump_cancel.cancelled() => break,
                event = line_rx.recv() => {
                    let Some(event) = event else { break };
                    match event {
                        tailer::TailEvent::Line(line) => {
                            if let Some(processed) = pump_decoder.decode_line(&line) {
                                pump_supervisor.ingest(processed).await;
                            }
                        }
                        tailer::TailEvent::Ready => {
                            info!("Hook event log tailer ready");
                        }
                        tailer::TailEvent::Error(message) => {
                            warn!("Hook event log tailer error: {message}");
                        }
                    }
                }
            }
        }
    });

    // HTTP + WebSocket front end.
    let api_result = api::serve(config, Arc::clone(&supervisor), decoder, cancel.clone()).await;
    if let Err(e) = &api_result {
        error!("API server failed: {e}");
        cancel.cancel();
    }

    let _ = tail_task.await;
    let _ = pump_task.await;
    supervisor.stop().await;

    api_result
}
