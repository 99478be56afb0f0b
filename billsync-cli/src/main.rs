//! billsync: keep a local cache of billing report deliveries in sync.
//!
//! # Usage
//!
//! ```text
//! billsync sync [--full] --bucket <b> --report-name <r> [--store-root <dir>]
//! billsync status [--json]
//! billsync daemon start [--interval 5m] --bucket <b> --report-name <r>
//! billsync daemon stop|status
//! billsync daemon sync [--full]
//! ```

mod commands;
mod settings;

use anyhow::Result;
use clap::{Parser, Subcommand};

use billsync_daemon::{init_tracing, LogFormat};
use commands::{daemon::DaemonCommand, status::StatusArgs, sync::SyncArgs};

#[derive(Parser, Debug)]
#[command(
    name = "billsync",
    version,
    about = "Mirror billing report deliveries from object storage into a local cache",
    long_about = None,
)]
struct Cli {
    /// Log line encoding on stderr.
    #[arg(
        long,
        global = true,
        env = "BILLSYNC_LOG_FORMAT",
        default_value_t = LogFormat::Text
    )]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one sync pass, then relink and recompute if anything changed.
    Sync(SyncArgs),

    /// Show tracked periods and their cached artifacts.
    Status(StatusArgs),

    /// Run or talk to the background sync daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);
    match cli.command {
        Commands::Sync(args) => args.run(),
        Commands::Status(args) => args.run(),
        Commands::Daemon { command } => commands::daemon::run(command),
    }
}
