//! Microsecond-precision timestamp type
//!
//! Timestamps are stored as signed microseconds since the Unix epoch
//! (1970-01-01 00:00:00 UTC). Record bodies carry this value directly; the
//! range indexes score records by [`Timestamp::index_score`], which is the
//! offset in microseconds from [`INDEX_EPOCH_MICROS`] (2014-01-01 UTC) so
//! scores stay small and exactly representable.
//!
//! ## Usage
//!
//! Never expose raw arithmetic. Use explicit constructors:
//!
//! ```
//! use velostore_core::Timestamp;
//!
//! let now = Timestamp::now();
//! let from_secs = Timestamp::from_secs(1000);
//! let from_micros = Timestamp::from_micros(1_000_000_000);
//! assert_eq!(from_secs, from_micros);
//! ```

use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// 2014-01-01T00:00:00Z in microseconds since the Unix epoch
pub const INDEX_EPOCH_MICROS: i64 = 1_388_534_400_000_000;

/// Microsecond-precision timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Unix epoch (1970-01-01 00:00:00 UTC)
    pub const EPOCH: Timestamp = Timestamp(0);

    /// Anchor of range-index scores
    pub const INDEX_EPOCH: Timestamp = Timestamp(INDEX_EPOCH_MICROS);

    // =========================================================================
    // Constructors
    // =========================================================================

    /// Create a timestamp for the current moment
    pub fn now() -> Self {
        Timestamp(Utc::now().timestamp_micros())
    }

    /// Create a timestamp from microseconds since epoch
    #[inline]
    pub const fn from_micros(micros: i64) -> Self {
        Timestamp(micros)
    }

    /// Create a timestamp from milliseconds since epoch
    #[inline]
    pub const fn from_millis(millis: i64) -> Self {
        Timestamp(millis.saturating_mul(1_000))
    }

    /// Create a timestamp from seconds since epoch
    #[inline]
    pub const fn from_secs(secs: i64) -> Self {
        Timestamp(secs.saturating_mul(1_000_000))
    }

    /// Convert from a chrono UTC datetime (sub-microsecond precision is dropped)
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Timestamp(dt.timestamp_micros())
    }

    /// Build from a range-index score
    pub const fn from_index_score(score: i64) -> Self {
        Timestamp(score.saturating_add(INDEX_EPOCH_MICROS))
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Microseconds since Unix epoch
    #[inline]
    pub const fn as_micros(&self) -> i64 {
        self.0
    }

    /// Seconds since Unix epoch (truncates toward negative infinity)
    #[inline]
    pub const fn as_secs(&self) -> i64 {
        self.0.div_euclid(1_000_000)
    }

    /// Microseconds elapsed since the index anchor; negative before 2014
    #[inline]
    pub const fn index_score(&self) -> i64 {
        self.0.saturating_sub(INDEX_EPOCH_MICROS)
    }

    /// As a chrono datetime
    pub fn to_datetime(&self) -> DateTime<Utc> {
        Utc.timestamp_micros(self.0)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    // =========================================================================
    // Duration Operations
    // =========================================================================

    /// Add a duration, saturating on overflow
    pub fn saturating_add(&self, duration: Duration) -> Self {
        Timestamp(self.0.saturating_add(duration_micros(duration)))
    }

    /// Subtract a duration, saturating on overflow
    pub fn saturating_sub(&self, duration: Duration) -> Self {
        Timestamp(self.0.saturating_sub(duration_micros(duration)))
    }

    /// Duration since an earlier timestamp, `None` if `earlier` is later
    pub fn duration_since(&self, earlier: Timestamp) -> Option<Duration> {
        let micros = i128::from(self.0) - i128::from(earlier.0);
        u64::try_from(micros).ok().map(Duration::from_micros)
    }

    /// Snap to "local midnight"
    ///
    /// Takes the UTC calendar date of this instant, sets the time to 00:00
    /// UTC, then shifts by `offset_minutes`. Callers pass their timezone
    /// offset in minutes; every event on the same UTC date lands on the same
    /// instant.
    pub fn align_to_local_midnight(&self, offset_minutes: i32) -> Self {
        let midnight = self
            .to_datetime()
            .date_naive()
            .and_time(NaiveTime::MIN)
            .and_utc();
        Timestamp::from_datetime(midnight)
            .shift_minutes(offset_minutes)
    }

    fn shift_minutes(&self, minutes: i32) -> Self {
        Timestamp(self.0.saturating_add(i64::from(minutes) * 60_000_000))
    }
}

fn duration_micros(duration: Duration) -> i64 {
    i64::try_from(duration.as_micros()).unwrap_or(i64::MAX)
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_datetime().to_rfc3339())
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Timestamp::from_datetime(dt)
    }
}
