//! Timestamp and ID primitives for the timeline model.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

/// A signed count of nanoseconds relative to a track's stream origin.
///
/// Arithmetic is exact integer arithmetic; conversion to/from sample
/// indices goes through [`Timestamp::from_samples`] / [`Timestamp::to_samples`]
/// using a sample rate, rounding to nearest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0);

    pub fn from_nanos(nanos: i64) -> Self {
        Timestamp(nanos)
    }

    pub fn nanos(self) -> i64 {
        self.0
    }

    /// Converts a sample count at `sample_rate_hz` into a duration, rounding
    /// to the nearest nanosecond.
    pub fn from_samples(samples: i64, sample_rate_hz: u32) -> Self {
        let nanos = (samples as i128 * 1_000_000_000i128 + sample_rate_hz as i128 / 2)
            / sample_rate_hz as i128;
        Timestamp(nanos as i64)
    }

    /// Converts this timestamp into a sample count at `sample_rate_hz`,
    /// rounding to the nearest sample. Negative timestamps round toward zero.
    pub fn to_samples(self, sample_rate_hz: u32) -> i64 {
        let n = self.0 as i128 * sample_rate_hz as i128;
        let half = 1_000_000_000i128 / 2;
        if n >= 0 {
            ((n + half) / 1_000_000_000i128) as i64
        } else {
            ((n - half) / 1_000_000_000i128) as i64
        }
    }

    pub fn clamp(self, lo: Timestamp, hi: Timestamp) -> Timestamp {
        if self < lo {
            lo
        } else if self > hi {
            hi
        } else {
            self
        }
    }
}

impl Add for Timestamp {
    type Output = Timestamp;
    fn add(self, rhs: Timestamp) -> Timestamp {
        Timestamp(self.0 + rhs.0)
    }
}

impl Sub for Timestamp {
    type Output = Timestamp;
    fn sub(self, rhs: Timestamp) -> Timestamp {
        Timestamp(self.0 - rhs.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ns", self.0)
    }
}

/// An opaque, globally-unique, lexicographically-sortable-by-creation-order
/// identifier.
///
/// Backed by a UUIDv7: its first 48 bits are a millisecond timestamp, so the
/// canonical hyphenated string representation sorts lexicographically in
/// creation order, same as the xid identifiers the original implementation
/// used.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(String);

impl Id {
    pub fn new() -> Self {
        Id(uuid::Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Id {
    fn default() -> Self {
        Id::new()
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Id(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_round_trip_is_exact_at_boundaries() {
        let ts = Timestamp::from_samples(16_000, 16_000);
        assert_eq!(ts, Timestamp::from_nanos(1_000_000_000));
        assert_eq!(ts.to_samples(16_000), 16_000);
    }

    #[test]
    fn sample_conversion_rounds_to_nearest() {
        // 1 sample at 3 Hz = 333_333_333.33ns, rounds to 333_333_333
        let ts = Timestamp::from_samples(1, 3);
        assert_eq!(ts.nanos(), 333_333_333);
    }

    #[test]
    fn ids_are_unique_and_lexically_increasing_over_time() {
        let a = Id::new();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = Id::new();
        assert_ne!(a, b);
        assert!(a.as_str() < b.as_str());
    }
}
