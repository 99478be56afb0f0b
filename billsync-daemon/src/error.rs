use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Error surface for the daemon runtime and its socket protocol.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("sync error: {0}")]
    Sync(#[from] billsync_sync::SyncError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("daemon protocol error: {0}")]
    Protocol(String),

    /// A queued pass failed; the message is the processor's error.
    #[error("sync pass failed: {0}")]
    PassFailed(String),

    #[error("daemon is not running (socket missing: {socket})")]
    DaemonNotRunning { socket: PathBuf },

    #[error("another daemon is already serving {socket}")]
    SocketInUse { socket: PathBuf },

    #[error("signal handler failed: {0}")]
    Signal(#[source] std::io::Error),

    /// A pass ran past its deadline and was dropped.
    #[error("sync pass exceeded its {}s deadline", .after.as_secs())]
    DeadlineExceeded { after: Duration },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
