//! Coding agent bridge CLI.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Supervise interactive coding assistants running in tmux.
#[derive(Parser, Debug)]
#[command(name = "cab")]
#[command(about = "Coding agent bridge: supervise AI assistants in tmux sessions")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the bridge server (HTTP + WebSocket API).
    Server(ServerArgs),
    /// Install the hook relay script and assistant hook configuration.
    Setup(SetupArgs),
    /// Remove bridge hook entries from assistant configuration.
    Uninstall(SetupArgs),
    /// Report dependency and adapter availability.
    Doctor,
}

#[derive(clap::Args, Debug)]
struct ServerArgs {
    /// HTTP listen port.
    #[arg(long, value_name = "PORT")]
    port: Option<u16>,

    /// HTTP listen host.
    #[arg(long, value_name = "HOST")]
    host: Option<String>,

    /// Bridge data directory (default: $CAB_HOME or ~/.cab).
    #[arg(long, value_name = "PATH")]
    data_dir: Option<PathBuf>,

    /// Only decode hook payloads from this adapter.
    #[arg(long, value_name = "NAME")]
    agent: Option<String>,

    /// Enable verbose logging.
    #[arg(long)]
    debug: bool,
}

#[derive(clap::Args, Debug)]
struct SetupArgs {
    /// Bridge data directory (default: $CAB_HOME or ~/.cab).
    #[arg(long, value_name = "PATH")]
    data_dir: Option<PathBuf>,

    /// HTTP port the hook script should POST to.
    #[arg(long, value_name = "PORT")]
    port: Option<u16>,

    /// Limit to one adapter (default: all registered).
    #[arg(long, value_name = "NAME")]
    agent: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Server(args) => {
            commands::server::run(
                args.port,
                args.host,
                args.data_dir,
                args.agent,
                args.debug,
            )
            .await
        }
        Command::Setup(args) => commands::setup::run(args.data_dir, args.port, args.agent),
        Command::Uninstall(args) => commands::uninstall::run(args.data_dir, args.agent),
        Command::Doctor => commands::doctor::run(),
    }
}
