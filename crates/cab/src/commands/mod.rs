pub mod doctor;
pub mod server;
pub mod setup;
pub mod uninstall;

use anyhow::Result;
use cab_core::BridgeConfig;
use std::path::PathBuf;

/// Resolve the runtime config from CLI overrides.
pub fn resolve_config(
    port: Option<u16>,
    host: Option<String>,
    data_dir: Option<PathBuf>,
    agent: Option<String>,
) -> Result<BridgeConfig> {
    let mut config = BridgeConfig::resolve()?;
    if let Some(port) = port {
        config.port = port;
    }
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(data_dir) = data_dir {
        config.data_dir = data_dir;
    }
    config.agent_filter = agent;
    Ok(config)
}
