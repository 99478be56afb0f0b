//! Period directory: which billing periods exist in the bucket.

use billsync_core::{BillingPeriod, SyncConfig};

use crate::error::SyncError;
use crate::remote::RemoteStore;

/// Only this many of the most recent periods are ever tracked.
pub const PERIOD_WINDOW: usize = 3;

/// List the period "directories" under the report prefix, most recent first,
/// truncated to [`PERIOD_WINDOW`].
///
/// A directory name that is not a valid period fails the whole listing.
pub async fn list_periods(
    config: &SyncConfig,
    remote: &dyn RemoteStore,
) -> Result<Vec<BillingPeriod>, SyncError> {
    let prefix = config.periods_prefix();
    let names = remote
        .list_prefixes(&prefix)
        .await
        .map_err(SyncError::Listing)?;

    let mut periods = names
        .iter()
        .map(|name| name.parse::<BillingPeriod>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(SyncError::MalformedPeriod)?;

    periods.sort_by(|a, b| b.cmp(a));
    periods.dedup();
    periods.truncate(PERIOD_WINDOW);

    tracing::debug!(prefix = %prefix, found = names.len(), kept = periods.len(), "listed periods");
    Ok(periods)
}
