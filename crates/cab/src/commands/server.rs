//! `cab server` — run the bridge daemon.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub async fn run(
    port: Option<u16>,
    host: Option<String>,
    data_dir: Option<PathBuf>,
    agent: Option<String>,
    debug: bool,
) -> Result<()> {
    let mut config = super::resolve_config(port, host, data_dir, agent)?;
    config.debug = debug;
    cab_core::logging::init(&config);
    info!(
        "Bridge starting (data dir: {}, port: {})",
        config.data_dir.display(),
        config.port
    );

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            let mut sigterm =
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(signal) => signal,
                    Err(e) => {
                        tracing::warn!("Failed to install SIGTERM handler: {e}");
                        let _ = ctrl_c.await;
                        signal_cancel.cancel();
                        return;
                    }
                };
            tokio::select! {
                _ = ctrl_c => info!("Received SIGINT"),
                _ = sigterm.recv() => info!("Received SIGTERM"),
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("Received Ctrl+C");
        }

        signal_cancel.cancel();
    });

    cab_daemon::run(config, cancel)
        .await
        .context("bridge daemon failed")?;

    info!("Bridge shutdown complete");
    Ok(())
}
