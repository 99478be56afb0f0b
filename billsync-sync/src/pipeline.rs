//! Shared sync pipeline entrypoint used by CLI and daemon.
//!
//! A pipeline pass is: orchestrate, persist state if it moved, and after a
//! changed pass refresh the reference links and run the recompute hook.

use std::path::PathBuf;

use billsync_core::SyncConfig;

use crate::error::SyncError;
use crate::orchestrator::{self, SyncMode, SyncOutcome};
use crate::remote::RemoteStore;
use crate::state::SyncState;

pub type RecomputeError = Box<dyn std::error::Error + Send + Sync>;

/// Downstream consumer of the artifact set, called after a changed pass.
pub trait Recompute: Send + Sync {
    /// `links` are the reference links in rank order.
    fn recompute(&self, config: &SyncConfig, links: &[PathBuf]) -> Result<(), RecomputeError>;
}

/// Hook that only reports the artifact set in the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogArtifacts;

impl Recompute for LogArtifacts {
    fn recompute(&self, config: &SyncConfig, links: &[PathBuf]) -> Result<(), RecomputeError> {
        tracing::info!(
            repository = %config.repository_path.display(),
            queries = %config.queries_path.display(),
            artifacts = links.len(),
            "artifact set ready for recompute"
        );
        Ok(())
    }
}

/// Result of one pipeline pass.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PipelineReport {
    pub outcome: SyncOutcome,
    /// State file was rewritten.
    pub saved: bool,
    /// Reference links after the pass; empty when they were not refreshed.
    pub links: Vec<PathBuf>,
    pub recomputed: bool,
}

/// Run one pass against an already loaded `state`.
///
/// A `Full` pass always relinks and recomputes, so the first pass after
/// start-up rebuilds downstream views even when nothing was fetched. A
/// pass that moved the artifact set stays pending downstream until links
/// and the hook both succeed; later passes retry them until they do.
pub async fn run(
    config: &SyncConfig,
    remote: &dyn RemoteStore,
    state: &mut SyncState,
    mode: SyncMode,
    hook: &dyn Recompute,
) -> Result<PipelineReport, SyncError> {
    let outcome = orchestrator::sync_at(config, remote, state, chrono::Utc::now(), mode).await?;

    let retrying = state.downstream_pending && !outcome.changed;
    if outcome.changed || mode == SyncMode::Full {
        state.downstream_pending = true;
    }
    let pending = state.downstream_pending;

    let saved = outcome.state_changed || pending;
    if saved {
        state.save(config)?;
    }

    let mut report = PipelineReport {
        outcome,
        saved,
        ..PipelineReport::default()
    };
    if !pending {
        tracing::debug!("nothing changed");
        return Ok(report);
    }
    if retrying {
        tracing::info!("retrying downstream refresh left over from an earlier pass");
    }

    report.links = crate::links::refresh(config, state)?;
    hook.recompute(config, &report.links)
        .map_err(SyncError::Recompute)?;
    state.downstream_pending = false;
    state.save(config)?;
    report.recomputed = true;
    tracing::info!(
        changed = report.outcome.changed,
        artifacts = report.links.len(),
        "pipeline pass complete"
    );
    Ok(report)
}

/// Load state from disk, then [`run`].
pub async fn run_once(
    config: &SyncConfig,
    remote: &dyn RemoteStore,
    mode: SyncMode,
    hook: &dyn Recompute,
) -> Result<PipelineReport, SyncError> {
    let mut state = SyncState::load(config)?;
    run(config, remote, &mut state, mode, hook).await
}
