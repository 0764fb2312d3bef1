//! # Tideline
//!
//! A versioned segment-timeline and overshadow-resolution engine for
//! time-partitioned column stores.
//!
//! The queryable unit is an immutable segment covering one dataset and one
//! time interval, existing in possibly overlapping versions and partitions.
//! This crate answers, at any instant, which set of segments is authoritative
//! for a dataset and time range, and which segments are permanently
//! superseded and eligible for cleanup. It is a purely in-memory library:
//! metadata polling, ingestion, and query execution live in its callers.

pub mod catalog;
pub mod config;
pub mod model;
pub mod shard;
pub mod snapshot;
pub mod temporal;
pub mod timeline;

// Re-export main types for convenience
pub use catalog::Catalog;
pub use config::{CatalogConfig, ConfigError, ConfigOverrides};
pub use model::{SegmentDescriptor, SegmentId, Version};
pub use shard::{PartitionChunk, PartitionSet, ShardSpec};
pub use snapshot::{CurrentSnapshot, DatasetSegments, Snapshot};
pub use temporal::{Instant, Interval};
pub use timeline::{Completeness, SegmentTimeline, TimelineSlice};
