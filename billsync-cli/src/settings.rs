//! Command-line settings shared by the subcommands.
//!
//! Every flag has a `BILLSYNC_*` environment fallback so the daemon can be
//! configured from a service unit without a long argument list.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;

use billsync_core::SyncConfig;
use billsync_sync::ObjectStoreRemote;

pub const DEFAULT_REPOSITORY: &str = "/var/lib/billsync/repository";
pub const DEFAULT_QUERIES: &str = "/etc/billsync/queries";
pub const DEFAULT_STATE_FILE: &str = "/var/lib/billsync/state.json";
pub const DEFAULT_REGION: &str = "us-east-1";

/// Where the local cache lives.
#[derive(Args, Debug, Clone)]
pub struct CacheArgs {
    /// Cache root; artifacts are written under `<repository>/data`.
    #[arg(long, env = "BILLSYNC_REPOSITORY", default_value = DEFAULT_REPOSITORY)]
    pub repository: PathBuf,

    /// Persisted sync state.
    #[arg(long, env = "BILLSYNC_STATE_FILE", default_value = DEFAULT_STATE_FILE)]
    pub state_file: PathBuf,
}

/// Which report to mirror and where to read it from.
#[derive(Args, Debug, Clone)]
pub struct ReportArgs {
    /// Bucket the report is delivered to; manifests must name it too.
    #[arg(long, env = "BILLSYNC_BUCKET")]
    pub bucket: String,

    #[arg(long, env = "BILLSYNC_REPORT_NAME")]
    pub report_name: String,

    /// Path prefix configured on the report delivery.
    #[arg(long, env = "BILLSYNC_REPORT_PREFIX")]
    pub report_prefix: Option<String>,

    /// Query definitions handed to the recompute step.
    #[arg(long, env = "BILLSYNC_QUERIES", default_value = DEFAULT_QUERIES)]
    pub queries: PathBuf,

    /// Read from a local mirror of the bucket instead of S3.
    #[arg(long, env = "BILLSYNC_STORE_ROOT")]
    pub store_root: Option<PathBuf>,

    #[arg(long, env = "BILLSYNC_REGION", default_value = DEFAULT_REGION)]
    pub region: String,

    /// Custom S3-compatible endpoint.
    #[arg(long, env = "BILLSYNC_ENDPOINT")]
    pub endpoint: Option<String>,
}

impl ReportArgs {
    pub fn config(&self, cache: &CacheArgs) -> SyncConfig {
        SyncConfig {
            bucket: self.bucket.clone(),
            report_name: self.report_name.clone(),
            report_prefix: self.report_prefix.clone(),
            repository_path: cache.repository.clone(),
            queries_path: self.queries.clone(),
            state_file_path: cache.state_file.clone(),
        }
    }

    pub fn remote(&self) -> Result<Arc<ObjectStoreRemote>> {
        let remote = match self.store_root.as_deref() {
            Some(root) => ObjectStoreRemote::local(root)
                .with_context(|| format!("failed to open bucket mirror {}", root.display()))?,
            None => ObjectStoreRemote::s3(&self.bucket, &self.region, self.endpoint.as_deref())
                .with_context(|| format!("failed to configure S3 bucket '{}'", self.bucket))?,
        };
        Ok(Arc::new(remote))
    }
}

/// Parse `300`, `45s`, `5m`, `2h` or `1d`. Bare numbers are seconds.
pub fn parse_interval(raw: &str) -> std::result::Result<Duration, String> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(raw.len());
    let (digits, unit) = raw.split_at(split);
    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid interval '{raw}'; expected e.g. 300, 45s, 5m, 2h"))?;
    let seconds = match unit {
        "" | "s" => value,
        "m" => value * 60,
        "h" => value * 3600,
        "d" => value * 86_400,
        other => return Err(format!("unknown interval unit '{other}'; expected s, m, h or d")),
    };
    if seconds == 0 {
        return Err("interval must be greater than zero".to_string());
    }
    Ok(Duration::from_secs(seconds))
}
