//! Single-flight sync daemon: periodic trigger + sync processor + socket server.

mod error;
pub mod paths;
pub mod protocol;
mod runtime;
pub mod telemetry;

pub use error::DaemonError;
pub use protocol::{
    request_status, request_stop, request_sync, send_request, DaemonRequest, DaemonResponse,
};
pub use runtime::{run, start_blocking, DaemonOptions, PassRecord, PeriodSummary, SyncSummary};
pub use telemetry::{init_tracing, LogFormat};
