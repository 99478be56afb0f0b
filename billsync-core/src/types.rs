//! Domain types for billing report synchronization.
//!
//! [`BillingPeriod`] is parsed from remote directory names and serialized as
//! its raw string. [`ReportManifest`] mirrors the JSON manifest published next
//! to every report; only the fields the sync engine needs are modelled, the
//! rest are ignored on decode.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// `YYYYMMDD`, the date half of a period identifier.
pub const PERIOD_DATE_FORMAT: &str = "%Y%m%d";

/// Compact manifest timestamp, e.g. `20240101T000000Z`.
pub const MANIFEST_TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// The only content type the downstream query engine understands.
pub const CSV_CONTENT_TYPE: &str = "text/csv";

// ---------------------------------------------------------------------------
// BillingPeriod
// ---------------------------------------------------------------------------

/// A reporting interval named `<start>-<end>`, both 8-digit dates.
///
/// Ordering is the ordering of the raw identifier, which is chronological
/// because both halves are fixed width.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BillingPeriod {
    raw: String,
    start: NaiveDate,
    end: NaiveDate,
}

impl BillingPeriod {
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Midnight UTC at the start of the end date.
    pub fn end_instant(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.end.and_time(NaiveTime::MIN))
    }

    /// True once the period's end date lies strictly before `now`.
    ///
    /// Report end dates are interpreted in UTC.
    pub fn is_past_due(&self, now: DateTime<Utc>) -> bool {
        self.end_instant() < now
    }
}

impl FromStr for BillingPeriod {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CoreError::InvalidPeriod { raw: s.to_string() };
        let (start, end) = s.split_once('-').ok_or_else(invalid)?;
        let start = parse_period_date(start).ok_or_else(invalid)?;
        let end = parse_period_date(end).ok_or_else(invalid)?;
        if end < start {
            return Err(invalid());
        }
        Ok(Self {
            raw: s.to_string(),
            start,
            end,
        })
    }
}

fn parse_period_date(s: &str) -> Option<NaiveDate> {
    if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(s, PERIOD_DATE_FORMAT).ok()
}

impl TryFrom<String> for BillingPeriod {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<BillingPeriod> for String {
    fn from(period: BillingPeriod) -> Self {
        period.raw
    }
}

impl fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.raw.fmt(f)
    }
}

impl PartialOrd for BillingPeriod {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BillingPeriod {
    fn cmp(&self, other: &Self) -> Ordering {
        self.raw.cmp(&other.raw)
    }
}

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

/// Segment compression declared by a manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Gzip,
}

impl FromStr for Compression {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("gzip") {
            Ok(Compression::Gzip)
        } else {
            Err(CoreError::UnsupportedCompression(s.to_string()))
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compression::Gzip => write!(f, "GZIP"),
        }
    }
}

/// `billingPeriod` block of a manifest, in compact timestamp form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestPeriod {
    pub start: String,
    pub end: String,
}

/// A point-in-time description of one period's report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportManifest {
    pub assembly_id: String,
    pub compression: String,
    pub content_type: String,
    pub billing_period: ManifestPeriod,
    pub bucket: String,
    /// Segment object keys, in concatenation order.
    pub report_keys: Vec<String>,
}

impl ReportManifest {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn compression_kind(&self) -> Result<Compression, CoreError> {
        self.compression.parse()
    }

    pub fn period_start(&self) -> Result<DateTime<Utc>, CoreError> {
        parse_manifest_timestamp(&self.billing_period.start)
    }

    pub fn period_end(&self) -> Result<DateTime<Utc>, CoreError> {
        parse_manifest_timestamp(&self.billing_period.end)
    }
}

/// Parse a compact `YYYYMMDDTHHMMSSZ` timestamp as UTC.
pub fn parse_manifest_timestamp(raw: &str) -> Result<DateTime<Utc>, CoreError> {
    NaiveDateTime::parse_from_str(raw, MANIFEST_TIMESTAMP_FORMAT)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|_| CoreError::InvalidTimestamp {
            raw: raw.to_string(),
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
