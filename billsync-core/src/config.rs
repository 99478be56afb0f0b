//! Sync configuration and the layouts derived from it.
//!
//! # Remote layout
//!
//! ```text
//! <bucket>/
//!   [<report_prefix>/]<report_name>/
//!     <YYYYMMDD-YYYYMMDD>/
//!       <report_name>-Manifest.json
//!       <assembly_id>/<report_name>-<n>.csv.gz
//! ```
//!
//! # Local layout
//!
//! ```text
//! <repository>/
//!   data/
//!     <YYYYMMDD>-<assembly_id>.csv       (ready artifacts)
//!     <YYYYMMDD>-<assembly_id>.csv.tmp   (in-flight, never read)
//!   report-current.csv -> data/...
//!   report-1.csv       -> data/...
//! ```

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::error::CoreError;
use crate::types::{BillingPeriod, ReportManifest};

pub const DATA_DIR: &str = "data";
pub const ARTIFACT_EXTENSION: &str = "csv";
pub const TMP_SUFFIX: &str = ".tmp";

/// Everything the engine needs to know about one bucket/report pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub bucket: String,
    pub report_name: String,
    /// Optional path prefix configured on the report delivery.
    pub report_prefix: Option<String>,
    /// Cache root; artifacts live under `<repository>/data`.
    pub repository_path: PathBuf,
    /// Query definitions for the downstream engine; provisioned externally.
    pub queries_path: PathBuf,
    pub state_file_path: PathBuf,
}

impl SyncConfig {
    pub fn data_dir(&self) -> PathBuf {
        self.repository_path.join(DATA_DIR)
    }

    /// Key prefix under which every period is a "directory".
    pub fn periods_prefix(&self) -> String {
        match self
            .report_prefix
            .as_deref()
            .map(|p| p.trim_matches('/'))
            .filter(|p| !p.is_empty())
        {
            Some(prefix) => format!("{prefix}/{}", self.report_name),
            None => self.report_name.clone(),
        }
    }

    pub fn manifest_key(&self, period: &BillingPeriod) -> String {
        format!(
            "{}/{}/{}-Manifest.json",
            self.periods_prefix(),
            period,
            self.report_name
        )
    }

    /// Final on-disk location of the artifact a manifest materializes into.
    pub fn artifact_path(&self, manifest: &ReportManifest) -> Result<PathBuf, CoreError> {
        let start = manifest.period_start()?;
        let name = artifact_file_name(start, &manifest.assembly_id)?;
        Ok(self.data_dir().join(name))
    }
}

/// `<YYYYMMDD>-<assembly_id>.csv`, deterministic per manifest.
pub fn artifact_file_name(
    period_start: DateTime<Utc>,
    assembly_id: &str,
) -> Result<String, CoreError> {
    if assembly_id.is_empty()
        || assembly_id == "."
        || assembly_id == ".."
        || assembly_id.contains(['/', '\\'])
    {
        return Err(CoreError::InvalidAssemblyId(assembly_id.to_string()));
    }
    Ok(format!(
        "{}-{assembly_id}.{ARTIFACT_EXTENSION}",
        period_start.format("%Y%m%d")
    ))
}

/// `<path>.tmp`, the in-flight sibling of `path`.
pub fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(TMP_SUFFIX);
    PathBuf::from(name)
}

/// Ready artifacts end in `.csv`; temporary siblings end in `.csv.tmp`.
pub fn is_ready_artifact(file_name: &str) -> bool {
    file_name
        .strip_suffix(ARTIFACT_EXTENSION)
        .is_some_and(|stem| stem.ends_with('.'))
}
