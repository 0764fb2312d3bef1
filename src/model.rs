//! # Data Model
//!
//! Segment identity and descriptor types. A segment is the immutable unit of
//! data for one (dataset, interval, version, partition); it is never mutated,
//! only superseded wholesale by segments of a higher version.

use crate::shard::ShardSpec;
use crate::temporal::Interval;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque, totally ordered version token.
///
/// Versions compare lexicographically; producers encode them (typically from
/// timestamps) so that string order is creation order. A higher version for an
/// overlapping interval is preferred once its partition set is complete.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Version(pub String);

impl Version {
    /// Create a new version token
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Version {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}

/// The immutable four-part identity of a segment
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SegmentId {
    /// Dataset the segment belongs to
    pub dataset: String,
    /// Time interval the segment covers
    pub interval: Interval,
    /// Version of the data within that interval
    pub version: Version,
    /// Partition number within the version's shard space
    pub partition: u32,
}

impl SegmentId {
    /// Create a new segment identity
    pub fn new(
        dataset: impl Into<String>,
        interval: Interval,
        version: Version,
        partition: u32,
    ) -> Self {
        Self {
            dataset: dataset.into(),
            interval,
            version,
            partition,
        }
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}_{}_{}",
            self.dataset, self.interval.start, self.interval.end, self.version, self.partition
        )
    }
}

/// A used-segment descriptor as supplied by the metadata poller.
///
/// Carries the identity, the shard spec declaring the version's full partition
/// space, and metadata that is opaque to the timeline core (dimension/metric
/// names, payload size).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentDescriptor {
    /// Dataset the segment belongs to
    pub dataset: String,
    /// Time interval the segment covers
    pub interval: Interval,
    /// Version of the data within that interval
    pub version: Version,
    /// How this version's data is divided into partitions
    pub shard_spec: ShardSpec,
    /// Partition number of this segment within the shard space
    pub partition: u32,
    /// Dimension column names (not interpreted here)
    #[serde(default)]
    pub dimensions: Vec<String>,
    /// Metric column names (not interpreted here)
    #[serde(default)]
    pub metrics: Vec<String>,
    /// Payload size in bytes, for capacity reporting
    #[serde(default)]
    pub size_bytes: u64,
}

impl SegmentDescriptor {
    /// Create a new descriptor with empty metadata
    pub fn new(
        dataset: impl Into<String>,
        interval: Interval,
        version: impl Into<Version>,
        shard_spec: ShardSpec,
        partition: u32,
    ) -> Self {
        Self {
            dataset: dataset.into(),
            interval,
            version: version.into(),
            shard_spec,
            partition,
            dimensions: Vec::new(),
            metrics: Vec::new(),
            size_bytes: 0,
        }
    }

    /// Set the dimension column names
    pub fn with_dimensions(mut self, dimensions: Vec<String>) -> Self {
        self.dimensions = dimensions;
        self
    }

    /// Set the metric column names
    pub fn with_metrics(mut self, metrics: Vec<String>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Set the payload size in bytes
    pub fn with_size_bytes(mut self, size_bytes: u64) -> Self {
        self.size_bytes = size_bytes;
        self
    }

    /// The segment's identity
    pub fn id(&self) -> SegmentId {
        SegmentId::new(
            self.dataset.clone(),
            self.interval,
            self.version.clone(),
            self.partition,
        )
    }
}

impl From<String> for Version {
    fn from(token: String) -> Self {
        Self(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_ordering() {
        let v1 = Version::new("2011-01-01T00:00:00");
        let v2 = Version::new("2011-01-02T00:00:00");
        assert!(v2 > v1);
        assert_eq!(v1, Version::from("2011-01-01T00:00:00"));
    }

    #[test]
    fn test_segment_id_display() {
        let id = SegmentId::new(
            "events",
            Interval::new(100, 200).unwrap(),
            Version::new("v1"),
            3,
        );
        assert_eq!(id.to_string(), "events_100_200_v1_3");
    }

    #[test]
    fn test_descriptor_identity() {
        let descriptor = SegmentDescriptor::new(
            "events",
            Interval::new(100, 200).unwrap(),
            "v1",
            ShardSpec::Single,
            0,
        )
        .with_dimensions(vec!["country".to_string()])
        .with_metrics(vec!["clicks".to_string()])
        .with_size_bytes(4096);

        let id = descriptor.id();
        assert_eq!(id.dataset, "events");
        assert_eq!(id.partition, 0);
        assert_eq!(descriptor.size_bytes, 4096);
        assert_eq!(descriptor.dimensions, vec!["country".to_string()]);
    }

    #[test]
    fn test_segment_id_equality_covers_all_parts() {
        let base = SegmentId::new(
            "events",
            Interval::new(100, 200).unwrap(),
            Version::new("v1"),
            0,
        );
        let other_partition = SegmentId::new(
            "events",
            Interval::new(100, 200).unwrap(),
            Version::new("v1"),
            1,
        );
        let other_version = SegmentId::new(
            "events",
            Interval::new(100, 200).unwrap(),
            Version::new("v2"),
            0,
        );

        assert_ne!(base, other_partition);
        assert_ne!(base, other_version);
    }
}
