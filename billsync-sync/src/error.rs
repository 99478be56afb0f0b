//! Error types for billsync-sync.
//!
//! Every [`SyncError`] belongs to one [`ErrorClass`]. Only transfer failures
//! are worth retrying on the next scheduled pass; the others need an operator.

use std::path::PathBuf;

use thiserror::Error;

use billsync_core::CoreError;

/// Coarse classification used by callers to decide how loudly to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Listing failed or a remote period name did not parse.
    Discovery,
    /// A fetched manifest cannot be trusted.
    ManifestIntegrity,
    /// Network, decompression or disk failure while fetching.
    Transfer,
    /// Missing directories or an unreadable state file.
    Setup,
    /// The downstream recompute hook failed.
    Recompute,
}

/// All errors that can arise from a sync pass.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("period discovery failed: {0}")]
    Listing(#[source] RemoteError),

    #[error("period discovery failed: {0}")]
    MalformedPeriod(#[source] CoreError),

    #[error("manifest {manifest} failed integrity check: {violation}")]
    ManifestIntegrity {
        manifest: String,
        violation: IntegrityViolation,
    },

    #[error("manifest fetch failed: {0}")]
    ManifestFetch(#[source] RemoteError),

    #[error("transfer of segment '{key}' into {path} failed: {source}")]
    Transfer {
        key: String,
        path: PathBuf,
        #[source]
        source: TransferError,
    },

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("setup error at {path}: {reason}")]
    Setup { path: PathBuf, reason: String },

    #[error("state file {path} is corrupt: {source}")]
    StateCorrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("state JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("recompute failed: {0}")]
    Recompute(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl SyncError {
    pub fn class(&self) -> ErrorClass {
        match self {
            SyncError::Listing(_) | SyncError::MalformedPeriod(_) => ErrorClass::Discovery,
            SyncError::ManifestIntegrity { .. } => ErrorClass::ManifestIntegrity,
            SyncError::ManifestFetch(_) | SyncError::Transfer { .. } | SyncError::Io { .. } => {
                ErrorClass::Transfer
            }
            SyncError::Setup { .. } | SyncError::StateCorrupt { .. } | SyncError::Json(_) => {
                ErrorClass::Setup
            }
            SyncError::Recompute(_) => ErrorClass::Recompute,
        }
    }

    /// True when the next scheduled pass may succeed without intervention.
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Transfer
    }
}

/// Why a manifest was rejected.
#[derive(Debug, Error)]
pub enum IntegrityViolation {
    #[error("unexpected content type '{0}'")]
    ContentType(String),

    #[error("declared bucket '{found}' does not match configured bucket '{expected}'")]
    BucketMismatch { expected: String, found: String },

    #[error("no report keys listed")]
    NoReportKeys,

    #[error("not a valid manifest document: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error(transparent)]
    Field(#[from] CoreError),
}

/// Failure reported by a [`crate::RemoteStore`].
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("failed to list '{prefix}': {source}")]
    List {
        prefix: String,
        #[source]
        source: object_store::Error,
    },

    #[error("failed to fetch '{key}': {source}")]
    Get {
        key: String,
        #[source]
        source: object_store::Error,
    },

    #[error("failed to configure object store: {0}")]
    Config(#[source] object_store::Error),
}

/// Failure inside one segment's producer/consumer pair.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error(transparent)]
    Remote(RemoteError),

    /// Decompression or disk write failure.
    #[error("{0}")]
    Io(#[source] std::io::Error),

    #[error("segment producer task failed: {0}")]
    Join(#[source] tokio::task::JoinError),
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}

/// Convenience constructor for [`SyncError::Setup`].
pub(crate) fn setup_err(path: impl Into<PathBuf>, reason: impl Into<String>) -> SyncError {
    SyncError::Setup {
        path: path.into(),
        reason: reason.into(),
    }
}
