//! Period-list freshness.
//!
//! A cached period list stays usable until its most recent period ends.
//! After that the bucket will have grown a new period directory and the
//! list has to be resolved again.
//!
//! Signal precedence:
//! 1. `Empty` (nothing cached, a cold pass is needed)
//! 2. `Stale` (the most recent period is past due)
//! 3. `Fresh`

use chrono::{DateTime, Utc};

use billsync_core::BillingPeriod;

/// Whether the cached period list can be reused for a warm pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeriodListFreshness {
    Empty,
    Fresh,
    Stale { period: BillingPeriod },
}

impl PeriodListFreshness {
    pub fn needs_listing(&self) -> bool {
        !matches!(self, PeriodListFreshness::Fresh)
    }
}

/// Classify `periods` (most recent first) at instant `now`.
pub fn freshness(periods: &[BillingPeriod], now: DateTime<Utc>) -> PeriodListFreshness {
    match periods.first() {
        None => PeriodListFreshness::Empty,
        Some(latest) if latest.is_past_due(now) => PeriodListFreshness::Stale {
            period: latest.clone(),
        },
        Some(_) => PeriodListFreshness::Fresh,
    }
}

/// Human-readable age of `timestamp` relative to `now`, e.g. `3h`.
pub fn format_age(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = now.signed_duration_since(timestamp).num_seconds().max(0) as u64;
    format_seconds(seconds)
}

fn format_seconds(seconds: u64) -> String {
    if seconds < 60 {
        return format!("{seconds}s");
    }
    if seconds < 60 * 60 {
        return format!("{}m", seconds / 60);
    }
    if seconds < 60 * 60 * 24 {
        return format!("{}h", seconds / (60 * 60));
    }
    format!("{}d", seconds / (60 * 60 * 24))
}
