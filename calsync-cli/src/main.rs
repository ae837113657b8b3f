//! calsync: keep remote calendars in step with a local event file.
//!
//! # Usage
//!
//! ```text
//! calsync [--config <path>] [--json-logs] sync [--dry-run] [--calendar <name>] [--json]
//! calsync watch
//! calsync status [--json]
//! calsync auth <backend>
//! ```

mod backends;
mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{auth::AuthArgs, status::StatusArgs, sync::SyncArgs, watch::WatchArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "calsync",
    version,
    about = "Sync a local event file to remote calendars",
    long_about = None,
)]
struct Cli {
    /// Config file (default: ~/.calsync/config.yaml).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Reconcile every calendar against every enabled backend once.
    Sync(SyncArgs),

    /// Watch the event source and sync after each burst of changes.
    Watch(WatchArgs),

    /// Show configuration and the calendars in the event source.
    Status(StatusArgs),

    /// Authenticate a backend ahead of running the daemon.
    Auth(AuthArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    calsync_daemon::init_tracing(cli.json_logs);

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Sync(args) => args.run(config),
        Commands::Watch(args) => args.run(config),
        Commands::Status(args) => args.run(config),
        Commands::Auth(args) => args.run(config),
    }
}
