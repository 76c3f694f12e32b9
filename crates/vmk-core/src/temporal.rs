//! # Temporal Types — UTC-Only Timestamps
//!
//! Defines `Timestamp`, a UTC-only timestamp with seconds precision.
//! Offers, escrow records and settlement tasks are persisted and compared
//! across process restarts; a single unambiguous wall-clock representation
//! keeps those comparisons stable.
//!
//! Scheduling decisions (offer expiry, retry due-times) never read the
//! system clock internally — callers pass an explicit `now`, which keeps
//! the retry and expiry logic deterministic under test.

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error constructing or parsing a timestamp.
#[derive(Error, Debug)]
pub enum TimestampError {
    /// The input string was not valid RFC 3339.
    #[error("invalid RFC 3339 timestamp {input:?}: {detail}")]
    InvalidFormat {
        /// The rejected input.
        input: String,
        /// Parser diagnostic.
        detail: String,
    },

    /// The input used a timezone offset other than `Z`.
    #[error("timestamp must use Z suffix (UTC only), got {0:?}")]
    NonUtc(String),

    /// The arithmetic result falls outside the representable range.
    #[error("timestamp arithmetic out of range")]
    OutOfRange,
}

/// A UTC-only timestamp, truncated to seconds precision.
///
/// # Construction
///
/// - [`Timestamp::now()`] — current UTC time, truncated.
/// - [`Timestamp::from_utc()`] — from a `DateTime<Utc>`, truncating sub-seconds.
/// - [`Timestamp::parse()`] — from an ISO8601 string, rejecting non-UTC offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create a timestamp from the current UTC time, truncated to seconds.
    pub fn now() -> Self {
        Self(truncate_to_seconds(Utc::now()))
    }

    /// Create a timestamp from a `chrono::DateTime<Utc>`, truncating sub-seconds.
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(truncate_to_seconds(dt))
    }

    /// Parse a timestamp from an RFC 3339 / ISO8601 string.
    ///
    /// **Rejects non-UTC inputs.** Only the `Z` suffix is accepted —
    /// even `+00:00`, which is semantically equivalent, is rejected so
    /// that persisted representations stay byte-for-byte canonical.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not valid RFC 3339 or uses a
    /// non-Z timezone offset.
    pub fn parse(s: &str) -> Result<Self, TimestampError> {
        if !s.ends_with('Z') {
            return Err(TimestampError::NonUtc(s.to_string()));
        }
        let dt = DateTime::parse_from_rfc3339(s).map_err(|e| TimestampError::InvalidFormat {
            input: s.to_string(),
            detail: e.to_string(),
        })?;
        Ok(Self(truncate_to_seconds(dt.with_timezone(&Utc))))
    }

    /// Create a timestamp from a Unix epoch timestamp (seconds).
    pub fn from_epoch_secs(secs: i64) -> Result<Self, TimestampError> {
        let dt = DateTime::from_timestamp(secs, 0).ok_or(TimestampError::OutOfRange)?;
        Ok(Self(dt))
    }

    /// Returns the Unix epoch timestamp in seconds.
    pub fn epoch_secs(&self) -> i64 {
        self.0.timestamp()
    }

    /// The timestamp `secs` seconds after this one.
    ///
    /// Used for expiry windows and retry due-times. Fails only if the
    /// result is outside chrono's representable range.
    pub fn checked_add_secs(&self, secs: u64) -> Result<Self, TimestampError> {
        let secs = i64::try_from(secs).map_err(|_| TimestampError::OutOfRange)?;
        let dt = self
            .0
            .checked_add_signed(Duration::seconds(secs))
            .ok_or(TimestampError::OutOfRange)?;
        Ok(Self(dt))
    }

    /// Access the inner `DateTime<Utc>`.
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Render as ISO8601 with Z suffix (e.g., `2026-01-15T12:00:00Z`).
    pub fn to_iso8601(&self) -> String {
        self.0.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_iso8601())
    }
}

/// Truncate a `DateTime<Utc>` to seconds precision (discard nanoseconds).
fn truncate_to_seconds(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.with_nanosecond(0).unwrap_or(dt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_now_has_no_subseconds() {
        let ts = Timestamp::now();
        assert_eq!(ts.as_datetime().nanosecond(), 0);
    }

    #[test]
    fn test_from_utc_truncates() {
        let dt = Utc.with_ymd_and_hms(2026, 1, 15, 12, 30, 45).unwrap();
        let dt_with_nanos = dt.with_nanosecond(123_456_789).unwrap();
        let ts = Timestamp::from_utc(dt_with_nanos);
        assert_eq!(ts.to_iso8601(), "2026-01-15T12:30:45Z");
    }

    #[test]
    fn test_parse_z_suffix_accepted() {
        let ts = Timestamp::parse("2026-01-15T12:00:00Z").unwrap();
        assert_eq!(ts.to_iso8601(), "2026-01-15T12:00:00Z");
    }

    #[test]
    fn test_parse_plus_zero_rejected() {
        assert!(Timestamp::parse("2026-01-15T12:00:00+00:00").is_err());
    }

    #[test]
    fn test_parse_positive_offset_rejected() {
        assert!(Timestamp::parse("2026-01-15T17:00:00+05:00").is_err());
    }

    #[test]
    fn test_parse_invalid_format() {
        assert!(Timestamp::parse("not-a-date").is_err());
        assert!(Timestamp::parse("2026-01-15").is_err());
        assert!(Timestamp::parse("").is_err());
    }

    #[test]
    fn test_checked_add_secs() {
        let ts = Timestamp::parse("2026-01-15T12:00:00Z").unwrap();
        let later = ts.checked_add_secs(3661).unwrap();
        assert_eq!(later.to_iso8601(), "2026-01-15T13:01:01Z");
    }

    #[test]
    fn test_epoch_roundtrip() {
        let ts = Timestamp::parse("2026-01-15T12:00:00Z").unwrap();
        let ts2 = Timestamp::from_epoch_secs(ts.epoch_secs()).unwrap();
        assert_eq!(ts, ts2);
    }

    #[test]
    fn test_ordering() {
        let earlier = Timestamp::parse("2026-01-15T12:00:00Z").unwrap();
        let later = earlier.checked_add_secs(1).unwrap();
        assert!(earlier < later);
    }

    #[test]
    fn test_serde_roundtrip() {
        let ts = Timestamp::parse("2026-01-15T12:00:00Z").unwrap();
        let json = serde_json::to_string(&ts).unwrap();
        let parsed: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(ts, parsed);
    }

    proptest::proptest! {
        #[test]
        fn prop_render_parse_roundtrip(secs in 0i64..=253_402_300_799) {
            let ts = Timestamp::from_epoch_secs(secs).unwrap();
            let reparsed = Timestamp::parse(&ts.to_iso8601()).unwrap();
            proptest::prop_assert_eq!(ts, reparsed);
            proptest::prop_assert_eq!(reparsed.epoch_secs(), secs);
        }

        #[test]
        fn prop_add_preserves_ordering(secs in 0i64..=4_000_000_000, delta in 0u64..=86_400_000) {
            let ts = Timestamp::from_epoch_secs(secs).unwrap();
            let later = ts.checked_add_secs(delta).unwrap();
            proptest::prop_assert!(later >= ts);
            proptest::prop_assert_eq!(later.epoch_secs() - ts.epoch_secs(), delta as i64);
        }
    }
}
