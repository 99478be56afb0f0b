//! `billsync status`: tracked periods and cache health.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use billsync_core::config::DATA_DIR;
use billsync_core::BillingPeriod;
use billsync_sync::freshness::{format_age, freshness};
use billsync_sync::{PeriodListFreshness, SyncState};

use crate::settings::CacheArgs;

/// Arguments for `billsync status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    pub cache: CacheArgs,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let state = SyncState::read(&self.cache.state_file).with_context(|| {
            format!(
                "failed to read sync state {}",
                self.cache.state_file.display()
            )
        })?;
        let report = build_report(&self.cache.repository, &state, Utc::now());
        if self.json {
            return print_json(report);
        }
        print_table(report);
        Ok(())
    }
}

/// Cache health of one tracked period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArtifactSignal {
    /// Listed but never fetched.
    Pending,
    Present,
    /// Recorded artifact is gone; the next pass fetches it again.
    Missing,
    /// Recorded by a version that did not track artifact names.
    Unrecorded,
}

#[derive(Debug, Clone)]
struct PeriodRow {
    period: BillingPeriod,
    signal: ArtifactSignal,
    artifact: Option<String>,
    last_modified: Option<DateTime<Utc>>,
    age: String,
}

#[derive(Debug, Clone)]
struct StatusReport {
    freshness: PeriodListFreshness,
    rows: Vec<PeriodRow>,
}

#[derive(Serialize)]
struct StatusReportJson {
    period_list: &'static str,
    periods: Vec<PeriodStatusJson>,
}

#[derive(Serialize)]
struct PeriodStatusJson {
    period: String,
    status: &'static str,
    artifact: Option<String>,
    last_modified: Option<String>,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "period")]
    period: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "artifact")]
    artifact: String,
    #[tabled(rename = "updated")]
    age: String,
}

fn build_report(repository: &Path, state: &SyncState, now: DateTime<Utc>) -> StatusReport {
    let periods: BTreeSet<&BillingPeriod> = state
        .periods
        .iter()
        .chain(state.report_last_modified.keys())
        .collect();

    let rows = periods
        .into_iter()
        .rev()
        .map(|period| {
            let last_modified = state.last_modified(period);
            let artifact = state.artifact_name(period).map(str::to_string);
            let signal = match (&last_modified, &artifact) {
                (None, _) => ArtifactSignal::Pending,
                (Some(_), None) => ArtifactSignal::Unrecorded,
                (Some(_), Some(name)) if repository.join(DATA_DIR).join(name).is_file() => {
                    ArtifactSignal::Present
                }
                (Some(_), Some(_)) => ArtifactSignal::Missing,
            };
            PeriodRow {
                period: period.clone(),
                signal,
                artifact,
                age: last_modified
                    .map(|ts| format_age(ts, now))
                    .unwrap_or_else(|| "never".to_string()),
                last_modified,
            }
        })
        .collect();

    StatusReport {
        freshness: freshness(&state.periods, now),
        rows,
    }
}

fn print_json(report: StatusReport) -> Result<()> {
    let payload = StatusReportJson {
        period_list: freshness_key(&report.freshness),
        periods: report
            .rows
            .into_iter()
            .map(|row| PeriodStatusJson {
                period: row.period.to_string(),
                status: signal_key(row.signal),
                artifact: row.artifact,
                last_modified: row.last_modified.map(|ts| ts.to_rfc3339()),
            })
            .collect(),
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize status JSON")?
    );
    Ok(())
}

fn print_table(report: StatusReport) {
    println!(
        "billsync v{} | {} periods | period list {}",
        env!("CARGO_PKG_VERSION"),
        report.rows.len(),
        freshness_label(&report.freshness),
    );

    if report.rows.is_empty() {
        println!("No periods tracked yet. Run 'billsync sync' first.");
        return;
    }

    let separator = "■".repeat(67).bright_black().to_string();
    println!("{separator}");
    println!(
        "Indicators: {} PRESENT  {} MISSING  {} UNRECORDED  {} PENDING",
        signal_indicator(ArtifactSignal::Present),
        signal_indicator(ArtifactSignal::Missing),
        signal_indicator(ArtifactSignal::Unrecorded),
        signal_indicator(ArtifactSignal::Pending),
    );
    println!("{separator}");

    let needs_sync = report
        .rows
        .iter()
        .any(|row| matches!(row.signal, ArtifactSignal::Missing | ArtifactSignal::Pending));
    let table_rows: Vec<StatusTableRow> = report
        .rows
        .into_iter()
        .map(|row| StatusTableRow {
            period: row.period.to_string(),
            status: format!("{} {}", signal_indicator(row.signal), signal_label(row.signal)),
            artifact: row.artifact.unwrap_or_else(|| "-".to_string()),
            age: row.age,
        })
        .collect();
    let mut table = Table::new(table_rows);
    table.with(Style::rounded());
    println!("{table}");

    if needs_sync || report.freshness.needs_listing() {
        println!("Run 'billsync sync' to refresh the cache.");
    }
}

fn freshness_key(freshness: &PeriodListFreshness) -> &'static str {
    match freshness {
        PeriodListFreshness::Empty => "empty",
        PeriodListFreshness::Fresh => "fresh",
        PeriodListFreshness::Stale { .. } => "stale",
    }
}

fn freshness_label(freshness: &PeriodListFreshness) -> String {
    match freshness {
        PeriodListFreshness::Empty => "EMPTY".bright_black().to_string(),
        PeriodListFreshness::Fresh => "FRESH".green().to_string(),
        PeriodListFreshness::Stale { period } => {
            format!("{} ({period} ended)", "STALE".yellow())
        }
    }
}

fn signal_key(signal: ArtifactSignal) -> &'static str {
    match signal {
        ArtifactSignal::Pending => "pending",
        ArtifactSignal::Present => "present",
        ArtifactSignal::Missing => "missing",
        ArtifactSignal::Unrecorded => "unrecorded",
    }
}

fn signal_label(signal: ArtifactSignal) -> &'static str {
    match signal {
        ArtifactSignal::Pending => "PENDING",
        ArtifactSignal::Present => "PRESENT",
        ArtifactSignal::Missing => "MISSING",
        ArtifactSignal::Unrecorded => "UNRECORDED",
    }
}

fn signal_indicator(signal: ArtifactSignal) -> String {
    match signal {
        ArtifactSignal::Pending => "■".bright_black().bold().to_string(),
        ArtifactSignal::Present => "■".green().bold().to_string(),
        ArtifactSignal::Missing => "■".red().bold().to_string(),
        ArtifactSignal::Unrecorded => "■".yellow().bold().to_string(),
    }
}
