//! Sync state store: durable per-period progress.
//!
//! Persists a [`SyncState`] JSON document at `SyncConfig::state_file_path`.
//! Writes use an atomic `.tmp` + rename. Files written by older exporters
//! (period list under `BillingPeriod`, `null` for an empty list) load
//! unchanged.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use billsync_core::config::tmp_sibling;
use billsync_core::{BillingPeriod, SyncConfig};

use crate::error::{io_err, setup_err, SyncError};

pub const STATE_VERSION: &str = "1";

/// What the engine remembers between passes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    #[serde(default = "default_version")]
    pub version: String,

    /// Manifest last-modified per period, recorded once its artifact is ready.
    #[serde(default, deserialize_with = "nullable")]
    pub report_last_modified: BTreeMap<BillingPeriod, DateTime<Utc>>,

    /// Last resolved period list, most recent first.
    #[serde(default, alias = "BillingPeriod", deserialize_with = "nullable")]
    pub periods: Vec<BillingPeriod>,

    /// Artifact file name (under the data directory) per period.
    #[serde(default, deserialize_with = "nullable")]
    pub report_artifacts: BTreeMap<BillingPeriod, String>,

    /// Set when a pass moved the artifact set and cleared once links and
    /// the recompute hook have caught up with it.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub downstream_pending: bool,
}

fn default_version() -> String {
    STATE_VERSION.to_string()
}

fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            version: default_version(),
            report_last_modified: BTreeMap::new(),
            periods: Vec::new(),
            report_artifacts: BTreeMap::new(),
            downstream_pending: false,
        }
    }
}

impl SyncState {
    /// Load state for a pass and prepare the cache directories.
    ///
    /// A missing state file yields the default state. The repository and
    /// data directories are created if absent; the query directory must
    /// already exist.
    pub fn load(config: &SyncConfig) -> Result<Self, SyncError> {
        let state = Self::read(&config.state_file_path)?;

        create_private_dir(&config.repository_path)?;
        create_private_dir(&config.data_dir())?;

        match std::fs::metadata(&config.queries_path) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(setup_err(&config.queries_path, "not a directory")),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(setup_err(&config.queries_path, "query directory is missing"))
            }
            Err(e) => return Err(io_err(&config.queries_path, e)),
        }

        Ok(state)
    }

    /// Read the state file without touching anything else on disk.
    pub fn read(path: &Path) -> Result<Self, SyncError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(io_err(path, e)),
        };
        let mut state: Self =
            serde_json::from_str(&contents).map_err(|source| SyncError::StateCorrupt {
                path: path.to_path_buf(),
                source,
            })?;
        state.periods.sort_by(|a, b| b.cmp(a));
        state.periods.dedup();
        Ok(state)
    }

    /// Save atomically: write `<path>.tmp`, then rename over `<path>`.
    pub fn save(&self, config: &SyncConfig) -> Result<(), SyncError> {
        let path = &config.state_file_path;
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        }

        let json = serde_json::to_string_pretty(self)?;
        let tmp = tmp_sibling(path);
        std::fs::write(&tmp, json).map_err(|e| io_err(&tmp, e))?;
        if let Err(e) = std::fs::rename(&tmp, path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(io_err(path, e));
        }
        tracing::debug!(path = %path.display(), "saved sync state");
        Ok(())
    }

    pub fn last_modified(&self, period: &BillingPeriod) -> Option<DateTime<Utc>> {
        self.report_last_modified.get(period).copied()
    }

    pub fn artifact_name(&self, period: &BillingPeriod) -> Option<&str> {
        self.report_artifacts.get(period).map(String::as_str)
    }

    pub fn is_recorded(&self, period: &BillingPeriod) -> bool {
        self.report_last_modified.contains_key(period)
    }

    /// Record a materialized artifact. Callers only do this after the
    /// artifact is at its final path.
    pub fn record(
        &mut self,
        period: &BillingPeriod,
        last_modified: DateTime<Utc>,
        artifact_name: String,
    ) {
        self.report_last_modified
            .insert(period.clone(), last_modified);
        self.report_artifacts.insert(period.clone(), artifact_name);
    }
}

#[cfg(unix)]
fn create_private_dir(path: &Path) -> Result<(), SyncError> {
    use std::os::unix::fs::DirBuilderExt;

    match std::fs::DirBuilder::new().mode(0o750).create(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(io_err(path, e)),
    }
}

#[cfg(not(unix))]
fn create_private_dir(path: &Path) -> Result<(), SyncError> {
    match std::fs::create_dir(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(io_err(path, e)),
    }
}
