//! `cab uninstall` — remove bridge hook entries and the relay script.

use anyhow::{bail, Context, Result};
use cab_daemon::adapters::{AdapterRegistry, AgentAdapter as _};
use std::path::PathBuf;

pub fn run(data_dir: Option<PathBuf>, agent: Option<String>) -> Result<()> {
    let config = super::resolve_config(None, None, data_dir, None)?;
    cab_core::logging::init(&config);

    let home = cab_core::home::user_home()?;
    let registry = AdapterRegistry::with_builtins();
    let mut removed = 0usize;
    for adapter in registry.iter() {
        if agent.as_deref().is_some_and(|a| a != adapter.name()) {
            continue;
        }
        adapter
            .uninstall_hooks(&home)
            .with_context(|| format!("failed to uninstall {} hooks", adapter.name()))?;
        println!("Removed {} hook entries", adapter.display_name());
        removed += 1;
    }
    if removed == 0 {
        bail!("no adapter named '{}'", agent.unwrap_or_default());
    }

    // Only drop the script when no adapter is left pointing at it.
    if agent.is_none() {
        let script_path = config.hook_script_path();
        match std::fs::remove_file(&script_path) {
            Ok(()) => println!("Removed hook script: {}", script_path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                bail!("failed to remove {}: {e}", script_path.display());
            }
        }
    }

    println!("Uninstall complete.");
    Ok(())
}
