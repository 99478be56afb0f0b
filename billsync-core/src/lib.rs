//! billsync core library: domain types, configuration, errors.
//!
//! - [`types`]: [`BillingPeriod`], [`ReportManifest`], [`Compression`]
//! - [`config`]: [`SyncConfig`] and the cache/remote layout derived from it
//! - [`error`]: [`CoreError`]

pub mod config;
pub mod error;
pub mod types;

pub use config::SyncConfig;
pub use error::CoreError;
pub use types::{BillingPeriod, Compression, ManifestPeriod, ReportManifest};
