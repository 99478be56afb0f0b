//! Synchronization orchestrator.
//!
//! One pass decides which periods to look at, resolves each manifest
//! conditionally, materializes changed reports and records the new
//! timestamps. The pass works on a copy of the caller's [`SyncState`] and
//! commits it only when every period succeeded.

use std::path::PathBuf;

use chrono::{DateTime, Utc};

use billsync_core::{BillingPeriod, SyncConfig};

use crate::error::{io_err, SyncError};
use crate::freshness::{freshness, PeriodListFreshness};
use crate::manifest::{self, ManifestFetch};
use crate::materialize::{self, MaterializeResult};
use crate::periods::list_periods;
use crate::remote::RemoteStore;
use crate::state::SyncState;

/// How much of the bucket a pass considers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Warm pass when a period list is cached, cold pass otherwise.
    #[default]
    Auto,
    /// Always re-list and revisit every unrecorded period.
    Full,
}

/// What happened to one period during a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeriodStatus {
    Unchanged,
    Materialized { path: PathBuf },
    /// A newer manifest pointed at an artifact already on disk.
    AlreadyPresent { path: PathBuf },
}

impl PeriodStatus {
    pub fn is_changed(&self) -> bool {
        !matches!(self, PeriodStatus::Unchanged)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodOutcome {
    pub period: BillingPeriod,
    pub status: PeriodStatus,
}

/// Summary of one pass.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncOutcome {
    /// True when at least one artifact was written or newly recorded.
    pub changed: bool,
    /// True when the committed state differs from the state passed in.
    pub state_changed: bool,
    /// True when the period list was re-resolved from the bucket.
    pub listed: bool,
    pub periods: Vec<PeriodOutcome>,
}

/// Run one automatic pass at the current instant.
pub async fn sync(
    config: &SyncConfig,
    remote: &dyn RemoteStore,
    state: &mut SyncState,
) -> Result<SyncOutcome, SyncError> {
    sync_at(config, remote, state, Utc::now(), SyncMode::Auto).await
}

/// Run one pass as if the current instant were `now`.
pub async fn sync_at(
    config: &SyncConfig,
    remote: &dyn RemoteStore,
    state: &mut SyncState,
    now: DateTime<Utc>,
    mode: SyncMode,
) -> Result<SyncOutcome, SyncError> {
    let mut next = state.clone();
    let mut listed = false;

    let targets: Vec<BillingPeriod> = if mode == SyncMode::Full || next.periods.is_empty() {
        next.periods = list_periods(config, remote).await?;
        listed = true;
        tracing::info!(periods = next.periods.len(), ?mode, "cold pass");
        let mut targets = Vec::new();
        for (index, period) in next.periods.iter().enumerate() {
            if index == 0 || needs_fetch(config, &next, period).await? {
                targets.push(period.clone());
            }
        }
        targets
    } else {
        match freshness(&next.periods, now) {
            PeriodListFreshness::Fresh => {}
            signal => {
                tracing::info!(?signal, "period list is stale, re-listing");
                next.periods = list_periods(config, remote).await?;
                listed = true;
            }
        }
        next.periods.first().cloned().into_iter().collect()
    };

    let mut outcomes = Vec::with_capacity(targets.len());
    for period in targets {
        let status = sync_period(config, remote, &mut next, &period).await?;
        outcomes.push(PeriodOutcome { period, status });
    }

    let changed = outcomes.iter().any(|o| o.status.is_changed());
    let state_changed = next != *state;
    *state = next;

    Ok(SyncOutcome {
        changed,
        state_changed,
        listed,
        periods: outcomes,
    })
}

async fn sync_period(
    config: &SyncConfig,
    remote: &dyn RemoteStore,
    state: &mut SyncState,
    period: &BillingPeriod,
) -> Result<PeriodStatus, SyncError> {
    let since = effective_last_modified(config, state, period).await?;

    let (manifest, last_modified) = match manifest::resolve(config, remote, period, since).await? {
        ManifestFetch::Unchanged => return Ok(PeriodStatus::Unchanged),
        ManifestFetch::Changed {
            manifest,
            last_modified,
        } => (manifest, last_modified),
    };

    let result = materialize::materialize(config, remote, &manifest).await?;
    let name = result
        .path()
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    state.record(period, last_modified, name);

    Ok(match result {
        MaterializeResult::Written { path } => PeriodStatus::Materialized { path },
        MaterializeResult::AlreadyExists { path } => PeriodStatus::AlreadyPresent { path },
    })
}

/// The recorded timestamp, unless the artifact it vouches for has gone
/// missing from the data directory.
async fn effective_last_modified(
    config: &SyncConfig,
    state: &SyncState,
    period: &BillingPeriod,
) -> Result<Option<DateTime<Utc>>, SyncError> {
    if artifact_missing(config, state, period).await? {
        return Ok(None);
    }
    Ok(state.last_modified(period))
}

/// Never recorded, or recorded against an artifact that is gone.
async fn needs_fetch(
    config: &SyncConfig,
    state: &SyncState,
    period: &BillingPeriod,
) -> Result<bool, SyncError> {
    Ok(!state.is_recorded(period) || artifact_missing(config, state, period).await?)
}

/// A recorded artifact name whose file is no longer in the data directory.
/// Entries without a name (older state files) are trusted.
async fn artifact_missing(
    config: &SyncConfig,
    state: &SyncState,
    period: &BillingPeriod,
) -> Result<bool, SyncError> {
    let Some(name) = state.artifact_name(period) else {
        return Ok(false);
    };
    if !state.is_recorded(period) {
        return Ok(false);
    }
    let path = config.data_dir().join(name);
    let present = tokio::fs::try_exists(&path)
        .await
        .map_err(|e| io_err(&path, e))?;
    if !present {
        tracing::warn!(period = %period, path = %path.display(), "recorded artifact missing, refetching");
    }
    Ok(!present)
}
