//! Parsing tests for billing period identifiers and manifest timestamps.

use billsync_core::types::parse_manifest_timestamp;
use billsync_core::{BillingPeriod, CoreError};
use chrono::{Datelike, Timelike};
use rstest::rstest;

#[rstest]
#[case("20240101-20240201", (2024, 1, 1), (2024, 2, 1))]
#[case("20231201-20240101", (2023, 12, 1), (2024, 1, 1))]
#[case("20240229-20240301", (2024, 2, 29), (2024, 3, 1))]
fn parses_valid_periods(
    #[case] raw: &str,
    #[case] start: (i32, u32, u32),
    #[case] end: (i32, u32, u32),
) {
    let period: BillingPeriod = raw.parse().expect("valid period");
    assert_eq!(period.as_str(), raw);
    assert_eq!(
        (period.start().year(), period.start().month(), period.start().day()),
        start
    );
    assert_eq!(
        (period.end().year(), period.end().month(), period.end().day()),
        end
    );
}

#[rstest]
#[case("")]
#[case("20240101")]
#[case("20240101-2024020")]
#[case("2024011-20240201")]
#[case("20240101_20240201")]
#[case("20240132-20240201")]
#[case("20230229-20230301")]
#[case("20240201-20240101")]
#[case("2024O101-20240201")]
#[case("20240101-20240201-20240301")]
fn rejects_malformed_periods(#[case] raw: &str) {
    assert_eq!(
        raw.parse::<BillingPeriod>(),
        Err(CoreError::InvalidPeriod {
            raw: raw.to_string()
        })
    );
}

#[rstest]
#[case("20240101T000000Z", (2024, 1, 1, 0, 0, 0))]
#[case("20241231T235959Z", (2024, 12, 31, 23, 59, 59))]
fn parses_manifest_timestamps(#[case] raw: &str, #[case] parts: (i32, u32, u32, u32, u32, u32)) {
    let ts = parse_manifest_timestamp(raw).expect("timestamp");
    assert_eq!(
        (ts.year(), ts.month(), ts.day(), ts.hour(), ts.minute(), ts.second()),
        parts
    );
}

#[rstest]
#[case("2024-01-01T00:00:00Z")]
#[case("20240101T000000")]
#[case("20240101")]
fn rejects_other_timestamp_shapes(#[case] raw: &str) {
    assert!(matches!(
        parse_manifest_timestamp(raw),
        Err(CoreError::InvalidTimestamp { .. })
    ));
}
