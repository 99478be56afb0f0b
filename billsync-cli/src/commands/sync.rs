//! `billsync sync`: one pass in the foreground.

use anyhow::{Context, Result};
use clap::Args;

use billsync_sync::pipeline::{self, PipelineReport};
use billsync_sync::{LogArtifacts, PeriodStatus, SyncMode};

use crate::settings::{CacheArgs, ReportArgs};

/// Arguments for `billsync sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    #[command(flatten)]
    pub report: ReportArgs,

    #[command(flatten)]
    pub cache: CacheArgs,

    /// Re-list every period and relink even when nothing changed.
    #[arg(long)]
    pub full: bool,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        let config = self.report.config(&self.cache);
        let remote = self.report.remote()?;
        let mode = if self.full {
            SyncMode::Full
        } else {
            SyncMode::Auto
        };

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("failed to start async runtime")?;
        let report = runtime
            .block_on(pipeline::run_once(
                &config,
                remote.as_ref(),
                mode,
                &LogArtifacts,
            ))
            .with_context(|| format!("sync failed for report '{}'", config.report_name))?;

        print_results(&config.report_name, &report);
        Ok(())
    }
}

fn print_results(report_name: &str, report: &PipelineReport) {
    let periods = &report.outcome.periods;
    let changed = periods.iter().filter(|p| p.status.is_changed()).count();

    if !report.outcome.changed && !report.recomputed {
        println!("✓ '{report_name}' — nothing to do");
    } else {
        println!(
            "✓ '{report_name}' synced ({changed} materialized, {} unchanged)",
            periods.len() - changed
        );
    }

    for outcome in periods {
        match &outcome.status {
            PeriodStatus::Materialized { path } => {
                println!("  ✎  {}  {}", outcome.period, path.display())
            }
            PeriodStatus::AlreadyPresent { path } => {
                println!("  ✓  {}  {}", outcome.period, path.display())
            }
            PeriodStatus::Unchanged => println!("  ·  {}", outcome.period),
        }
    }

    if report.recomputed {
        println!("  {} reference link(s) refreshed", report.links.len());
    }
}
