//! Error types for billsync-core.

use thiserror::Error;

/// Errors raised while parsing domain values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A remote period directory name is not `YYYYMMDD-YYYYMMDD`.
    #[error("malformed billing period '{raw}'; expected YYYYMMDD-YYYYMMDD")]
    InvalidPeriod { raw: String },

    /// A manifest timestamp is not in the compact `YYYYMMDDTHHMMSSZ` form.
    #[error("malformed manifest timestamp '{raw}'; expected YYYYMMDDTHHMMSSZ")]
    InvalidTimestamp { raw: String },

    #[error("unsupported report compression '{0}'")]
    UnsupportedCompression(String),

    /// Assembly ids end up in file names, so separators are rejected.
    #[error("invalid assembly id '{0}'")]
    InvalidAssemblyId(String),
}
