//! Manifest resolver: conditional fetch and integrity checks.

use chrono::{DateTime, Utc};

use billsync_core::config::artifact_file_name;
use billsync_core::types::CSV_CONTENT_TYPE;
use billsync_core::{BillingPeriod, ReportManifest, SyncConfig};

use crate::error::{IntegrityViolation, SyncError};
use crate::remote::{Conditional, RemoteStore};

/// Result of resolving one period's manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestFetch {
    /// The manifest has not changed since the recorded timestamp.
    Unchanged,
    /// A newer manifest; `last_modified` is what the caller records once the
    /// artifact is in place.
    Changed {
        manifest: ReportManifest,
        last_modified: DateTime<Utc>,
    },
}

/// Fetch the manifest for `period` unless it is unchanged since `last_modified`.
pub async fn resolve(
    config: &SyncConfig,
    remote: &dyn RemoteStore,
    period: &BillingPeriod,
    last_modified: Option<DateTime<Utc>>,
) -> Result<ManifestFetch, SyncError> {
    let key = config.manifest_key(period);
    let fetched = remote
        .get_if_modified_since(&key, last_modified)
        .await
        .map_err(SyncError::ManifestFetch)?;

    let (body, last_modified) = match fetched {
        Conditional::NotModified => {
            tracing::debug!(period = %period, "manifest not modified");
            return Ok(ManifestFetch::Unchanged);
        }
        Conditional::Modified {
            body,
            last_modified,
        } => (body, last_modified),
    };

    let integrity = |violation| SyncError::ManifestIntegrity {
        manifest: key.clone(),
        violation,
    };
    let manifest =
        ReportManifest::from_slice(&body).map_err(|e| integrity(IntegrityViolation::Malformed(e)))?;
    validate(config, &manifest).map_err(integrity)?;

    tracing::info!(
        period = %period,
        assembly_id = %manifest.assembly_id,
        parts = manifest.report_keys.len(),
        %last_modified,
        "manifest changed"
    );
    Ok(ManifestFetch::Changed {
        manifest,
        last_modified,
    })
}

/// Reject a manifest the materializer cannot safely act on.
pub fn validate(config: &SyncConfig, manifest: &ReportManifest) -> Result<(), IntegrityViolation> {
    if manifest.content_type != CSV_CONTENT_TYPE {
        return Err(IntegrityViolation::ContentType(manifest.content_type.clone()));
    }
    if manifest.bucket != config.bucket {
        return Err(IntegrityViolation::BucketMismatch {
            expected: config.bucket.clone(),
            found: manifest.bucket.clone(),
        });
    }
    if manifest.report_keys.is_empty() {
        return Err(IntegrityViolation::NoReportKeys);
    }
    manifest.compression_kind()?;
    manifest.period_end()?;
    // Start date and assembly id name the artifact.
    artifact_file_name(manifest.period_start()?, &manifest.assembly_id)?;
    Ok(())
}
