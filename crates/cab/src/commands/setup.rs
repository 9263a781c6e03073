//! `cab setup` — write the hook relay script and install assistant hooks.

use anyhow::{bail, Context, Result};
use cab_daemon::adapters::{AdapterRegistry, AgentAdapter as _};
use std::path::{Path, PathBuf};

/// The relay script: enrich the payload with hook/terminal metadata,
/// append it to the event log, then POST it to the bridge with a 2-second
/// budget, ignoring failures — the event log is the source of truth.
const HOOK_SCRIPT_TEMPLATE: &str = r#"#!/usr/bin/env bash
# coding-agent-hook.sh — relay one assistant hook payload to the bridge.
# Usage: coding-agent-hook.sh <agent> [<hook-name> | <json>]
set -u

AGENT="${1:-claude}"
EVENTS_FILE="__EVENTS_FILE__"
BRIDGE_URL="http://127.0.0.1:__PORT__/event"

if [ "$AGENT" = "codex" ]; then
  # Codex notify appends the payload as the final argument.
  PAYLOAD="${2:-}"
  HOOK_TYPE="$(printf '%s' "$PAYLOAD" | jq -r '.type // "agent-turn-complete"' 2>/dev/null || echo agent-turn-complete)"
else
  HOOK_TYPE="${2:-unknown}"
  PAYLOAD="$(cat)"
fi
[ -z "$PAYLOAD" ] && PAYLOAD='{}'

TMUX_PANE_ID="${TMUX_PANE:-}"
TMUX_SOCKET="${TMUX%%,*}"
TTY_NAME="$(tty 2>/dev/null || true)"
RECEIVED_AT="$(date -u +%Y-%m-%dT%H:%M:%SZ)"

ENRICHED="$(printf '%s' "$PAYLOAD" | jq -c \
  --arg hook_type "$HOOK_TYPE" \
  --arg agent "$AGENT" \
  --arg tmux_pane "$TMUX_PANE_ID" \
  --arg tmux_socket "$TMUX_SOCKET" \
  --arg tty "$TTY_NAME" \
  --arg received_at "$RECEIVED_AT" \
  '. + {hook_type: $hook_type, agent: $agent, tmux_pane: $tmux_pane,
        tmux_socket: $tmux_socket, tty: $tty, received_at: $received_at}' \
  2>/dev/null)" || ENRICHED=""
[ -z "$ENRICHED" ] && exit 0

mkdir -p "$(dirname "$EVENTS_FILE")"
printf '%s\n' "$ENRICHED" >> "$EVENTS_FILE"

curl -s -m 2 -X POST -H 'Content-Type: application/json' \
  -d "$ENRICHED" "$BRIDGE_URL" >/dev/null 2>&1 || true

exit 0
"#;

pub fn run(data_dir: Option<PathBuf>, port: Option<u16>, agent: Option<String>) -> Result<()> {
    let config = super::resolve_config(port, None, data_dir, None)?;
    cab_core::logging::init(&config);

    let script_path = write_hook_script(&config)?;
    println!("Wrote hook script: {}", script_path.display());

    let home = cab_core::home::user_home()?;
    let registry = AdapterRegistry::with_builtins();
    let mut installed = 0usize;
    for adapter in registry.iter() {
        if agent.as_deref().is_some_and(|a| a != adapter.name()) {
            continue;
        }
        adapter
            .install_hooks(&home, &script_path)
            .with_context(|| format!("failed to install {} hooks", adapter.name()))?;
        println!(
            "Installed {} hooks: {}",
            adapter.display_name(),
            adapter.settings_path(&home).display()
        );
        installed += 1;
    }
    if installed == 0 {
        bail!("no adapter named '{}'", agent.unwrap_or_default());
    }

    println!("Setup complete. Start the bridge with: cab server");
    Ok(())
}

/// Render and install the relay script, marked executable.
pub fn write_hook_script(config: &cab_core::BridgeConfig) -> Result<PathBuf> {
    let script_path = config.hook_script_path();
    let script = HOOK_SCRIPT_TEMPLATE
        .replace("__EVENTS_FILE__", &config.events_path().to_string_lossy())
        .replace("__PORT__", &config.port.to_string());

    write_executable(&script_path, &script)?;
    Ok(script_path)
}

fn write_executable(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, contents)
        .with_context(|| format!("failed to write {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
            .with_context(|| format!("failed to chmod {}", path.display()))?;
    }

    Ok(())
}
