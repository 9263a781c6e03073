//! `cab doctor` — report dependency and adapter availability.

use anyhow::Result;
use cab_daemon::adapters::{AdapterRegistry, AgentAdapter as _};

/// Binaries the bridge and its hook script lean on.
const REQUIRED_TOOLS: &[(&str, &str)] = &[
    ("tmux", "session management"),
    ("jq", "hook payload enrichment"),
    ("curl", "hook delivery to the bridge"),
];

pub fn run() -> Result<()> {
    cab_core::logging::init(&cab_core::BridgeConfig::default());

    let mut healthy = true;

    println!("Dependencies:");
    for (binary, purpose) in REQUIRED_TOOLS {
        match which::which(binary) {
            Ok(path) => println!("  ok      {binary} ({purpose}) at {}", path.display()),
            Err(_) => {
                healthy = false;
                println!("  MISSING {binary} ({purpose})");
            }
        }
    }

    println!("Adapters:");
    let registry = AdapterRegistry::with_builtins();
    for adapter in registry.iter() {
        if adapter.is_available() {
            println!("  ok      {} ({})", adapter.name(), adapter.display_name());
        } else {
            println!(
                "  absent  {} ({}) — not on PATH",
                adapter.name(),
                adapter.display_name()
            );
        }
    }

    if let Ok(home) = cab_core::home::user_home() {
        println!("Hook configuration:");
        for adapter in registry.iter() {
            let path = adapter.settings_path(&home);
            let installed = std::fs::read_to_string(&path)
                .map(|text| text.contains("coding-agent-hook.sh"))
                .unwrap_or(false);
            println!(
                "  {} {} ({})",
                if installed { "ok     " } else { "absent " },
                path.display(),
                adapter.name()
            );
        }
    }

    if healthy {
        println!("All required dependencies present.");
    } else {
        println!("Some dependencies are missing; the bridge may not work fully.");
    }
    Ok(())
}
