//! # billsync-sync
//!
//! Report synchronization engine: period discovery, conditional manifest
//! fetch, streaming materialization and durable sync state.
//!
//! Call [`pipeline::run`] for a complete pass (sync, persist, relink,
//! recompute), or [`orchestrator::sync_at`] to drive the engine directly.

pub mod error;
pub mod freshness;
pub mod links;
pub mod manifest;
pub mod materialize;
pub mod orchestrator;
pub mod periods;
pub mod pipeline;
pub mod remote;
pub mod state;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{ErrorClass, IntegrityViolation, RemoteError, SyncError, TransferError};
pub use freshness::PeriodListFreshness;
pub use manifest::ManifestFetch;
pub use materialize::MaterializeResult;
pub use orchestrator::{PeriodOutcome, PeriodStatus, SyncMode, SyncOutcome};
pub use pipeline::{LogArtifacts, PipelineReport, Recompute, RecomputeError};
pub use remote::{ObjectStoreRemote, RemoteStore};
pub use state::SyncState;
