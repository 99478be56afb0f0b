//! `billsync daemon`: background sync lifecycle.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use billsync_daemon::paths::socket_path;
use billsync_daemon::{
    request_status, request_stop, request_sync, start_blocking, DaemonError, DaemonOptions,
};
use billsync_sync::LogArtifacts;

use crate::settings::{parse_interval, CacheArgs, ReportArgs, DEFAULT_REPOSITORY};

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Run the daemon in the foreground (scheduler + socket server).
    Start(DaemonStartArgs),
    /// Request graceful daemon shutdown over the Unix socket.
    Stop(DaemonTarget),
    /// Query daemon runtime status over the Unix socket.
    Status(DaemonTarget),
    /// Run a pass through the daemon's queue and wait for it.
    Sync(DaemonSyncArgs),
}

#[derive(Args, Debug)]
pub struct DaemonStartArgs {
    #[command(flatten)]
    pub report: ReportArgs,

    #[command(flatten)]
    pub cache: CacheArgs,

    /// Time between passes, e.g. 300, 90s, 5m.
    #[arg(long, env = "BILLSYNC_INTERVAL", default_value = "5m", value_parser = parse_interval)]
    pub interval: Duration,

    /// Upper bound for one pass; defaults to the interval.
    #[arg(long, env = "BILLSYNC_DEADLINE", value_parser = parse_interval)]
    pub deadline: Option<Duration>,
}

/// Locates a running daemon by its cache root.
#[derive(Args, Debug)]
pub struct DaemonTarget {
    #[arg(long, env = "BILLSYNC_REPOSITORY", default_value = DEFAULT_REPOSITORY)]
    pub repository: PathBuf,
}

#[derive(Args, Debug)]
pub struct DaemonSyncArgs {
    #[command(flatten)]
    pub target: DaemonTarget,

    /// Re-list every period and relink even when nothing changed.
    #[arg(long)]
    pub full: bool,
}

pub fn run(command: DaemonCommand) -> Result<()> {
    match command {
        DaemonCommand::Start(args) => {
            let config = args.report.config(&args.cache);
            let remote = args.report.remote()?;
            let mut options = DaemonOptions::new(config, args.interval);
            if let Some(deadline) = args.deadline {
                options.deadline = deadline;
            }
            start_blocking(options, remote, Arc::new(LogArtifacts))
                .context("daemon exited with error")?;
        }
        DaemonCommand::Stop(target) => match request_stop(&target.repository) {
            Ok(()) => println!("daemon stop requested"),
            Err(DaemonError::DaemonNotRunning { .. }) => {
                println!("daemon is not running");
            }
            Err(err) => return Err(err).context("failed to stop daemon"),
        },
        DaemonCommand::Status(target) => match request_status(&target.repository) {
            Ok(status) => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&status)
                        .context("failed to render daemon status JSON")?
                );
            }
            Err(DaemonError::DaemonNotRunning { .. }) => {
                let payload = serde_json::json!({
                    "running": false,
                    "socket": socket_path(&target.repository).display().to_string(),
                });
                println!(
                    "{}",
                    serde_json::to_string_pretty(&payload)
                        .context("failed to render daemon status JSON")?
                );
            }
            Err(err) => return Err(err).context("failed to query daemon status"),
        },
        DaemonCommand::Sync(args) => {
            let summary = request_sync(&args.target.repository, args.full)
                .context("daemon sync request failed")?;
            println!(
                "{}",
                serde_json::to_string_pretty(&summary)
                    .context("failed to render sync summary JSON")?
            );
        }
    }

    Ok(())
}
