//! # Temporal Module
//!
//! Instants, half-open intervals, and the atomic-interval partitioning that
//! timeline resolution is built on. All times are UTC epoch milliseconds.

use serde::{Deserialize, Serialize};
use std::cmp::{max, min, Ordering};
use std::fmt;
use time::OffsetDateTime;

/// A temporal instant as UTC epoch milliseconds.
/// Using i64 to support both past and future times and to avoid floating point issues.
pub type Instant = i64;

/// Special sentinel values for open-ended intervals
pub const NEG_INF: Instant = i64::MIN;
pub const POS_INF: Instant = i64::MAX;

/// A temporal interval [start, end) where start < end
///
/// Intervals are half-open: the start is inclusive, the end is exclusive.
/// This ensures that adjacent intervals [t0, t1) and [t1, t2) tile a span
/// without gaps or double-counted boundary points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interval {
    /// Start time (inclusive)
    pub start: Instant,
    /// End time (exclusive)
    pub end: Instant,
}

impl Interval {
    /// Create a new interval with validation
    ///
    /// # Errors
    /// Returns an error if start >= end (zero-length intervals are not allowed)
    pub fn new(start: Instant, end: Instant) -> anyhow::Result<Self> {
        if start >= end {
            anyhow::bail!(
                "Invalid interval: start ({}) must be less than end ({})",
                start,
                end
            );
        }
        Ok(Self { start, end })
    }

    /// Create an interval from UTC datetimes, truncated to millisecond resolution
    pub fn from_utc_datetimes(start: OffsetDateTime, end: OffsetDateTime) -> anyhow::Result<Self> {
        let start_ms = (start.unix_timestamp_nanos() / 1_000_000) as Instant;
        let end_ms = (end.unix_timestamp_nanos() / 1_000_000) as Instant;
        Self::new(start_ms, end_ms)
    }

    /// Create an interval that covers all time
    pub fn all_time() -> Self {
        Self {
            start: NEG_INF,
            end: POS_INF,
        }
    }

    /// Check if this interval contains a specific instant
    pub fn contains(&self, instant: Instant) -> bool {
        self.start <= instant && instant < self.end
    }

    /// Check if this interval overlaps another.
    /// Half-open intervals overlap unless one ends at or before the other's start.
    #[inline]
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Check if this interval completely contains another:
    /// `self.start <= other.start && self.end >= other.end`.
    #[inline]
    pub fn encloses(&self, other: &Interval) -> bool {
        self.start <= other.start && self.end >= other.end
    }

    /// Compute the intersection with another interval.
    /// Returns None if the intervals don't overlap.
    pub fn intersect(&self, other: &Interval) -> Option<Interval> {
        let start = max(self.start, other.start);
        let end = min(self.end, other.end);

        if start < end {
            Some(Interval { start, end })
        } else {
            None
        }
    }

    /// Get the duration of this interval in milliseconds.
    /// Returns None for intervals with infinite endpoints.
    pub fn duration(&self) -> Option<i64> {
        if self.start == NEG_INF || self.end == POS_INF {
            None
        } else {
            Some(self.end - self.start)
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let start_str = if self.start == NEG_INF {
            "(-∞".to_string()
        } else {
            format!("[{}", self.start)
        };

        let end_str = if self.end == POS_INF {
            "+∞)".to_string()
        } else {
            format!("{})", self.end)
        };

        write!(f, "{}, {}", start_str, end_str)
    }
}

impl PartialOrd for Interval {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Interval {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.start.cmp(&other.start) {
            Ordering::Equal => self.end.cmp(&other.end),
            ordering => ordering,
        }
    }
}

/// Compute atomic intervals from a collection of intervals.
///
/// Atomic intervals are the finest-grained intervals where no boundary points
/// change within them. For example, given intervals [0,10), [5,15), [10,20),
/// the atomic intervals are [0,5), [5,10), [10,15), [15,20).
///
/// Within each atomic interval the set of covering entries is constant, so a
/// resolver can pick one winner per slice and know the answer holds across it.
pub fn atomic_intervals(intervals: &[Interval]) -> Vec<Interval> {
    if intervals.is_empty() {
        return Vec::new();
    }

    // Collect all boundary points
    let mut points: Vec<Instant> = Vec::with_capacity(intervals.len() * 2);
    for interval in intervals {
        points.push(interval.start);
        points.push(interval.end);
    }

    // Sort and deduplicate
    points.sort_unstable();
    points.dedup();

    if points.len() < 2 {
        return Vec::new();
    }

    // Create atomic intervals between consecutive points
    let mut result = Vec::with_capacity(points.len() - 1);
    for i in 0..points.len() - 1 {
        if let Ok(interval) = Interval::new(points[i], points[i + 1]) {
            result.push(interval);
        }
    }

    result
}
