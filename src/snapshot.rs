//! # Snapshot Module
//!
//! An immutable, timestamped aggregate of every dataset's used segments at
//! one instant: the grouped segment collections, one timeline per dataset,
//! and the eagerly computed global overshadowed-segment set. Built once per
//! refresh cycle and never mutated; superseded by the next snapshot through
//! [`CurrentSnapshot`], whose readers keep their frozen view for as long as
//! they hold the `Arc`.

use crate::model::{SegmentDescriptor, SegmentId};
use crate::temporal::{Instant, Interval};
use crate::timeline::{Completeness, SegmentTimeline};
use hashbrown::HashMap;
use parking_lot::RwLock;
use rustc_hash::FxHashSet;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// One dataset's deduplicated used-segment collection
#[derive(Debug)]
pub struct DatasetSegments {
    name: String,
    segments: BTreeMap<SegmentId, Arc<SegmentDescriptor>>,
    properties: BTreeMap<String, String>,
}

impl DatasetSegments {
    fn new(name: String, created_at: Instant) -> Self {
        let mut properties = BTreeMap::new();
        properties.insert("created".to_string(), created_at.to_string());
        Self {
            name,
            segments: BTreeMap::new(),
            properties,
        }
    }

    /// Add a segment unless an identical identity is already present.
    /// Returns whether the segment was added (first occurrence wins).
    fn add_if_absent(&mut self, segment: Arc<SegmentDescriptor>) -> bool {
        let id = segment.id();
        if self.segments.contains_key(&id) {
            return false;
        }
        self.segments.insert(id, segment);
        true
    }

    /// Dataset name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Segments in identity order
    pub fn segments(&self) -> impl Iterator<Item = &Arc<SegmentDescriptor>> {
        self.segments.values()
    }

    /// Look up one segment by identity
    pub fn get(&self, id: &SegmentId) -> Option<&Arc<SegmentDescriptor>> {
        self.segments.get(id)
    }

    /// Number of used segments in this dataset
    pub fn num_segments(&self) -> usize {
        self.segments.len()
    }

    /// Sum of the segments' payload sizes
    pub fn total_size_bytes(&self) -> u64 {
        self.segments.values().map(|s| s.size_bytes).sum()
    }

    /// Dataset properties ("created" carries the snapshot time)
    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }
}

/// Immutable point-in-time aggregate of all datasets' used segments,
/// timelines, and the global overshadowed set.
#[derive(Debug)]
pub struct Snapshot {
    snapshot_time: Instant,
    datasets: BTreeMap<String, DatasetSegments>,
    timelines: BTreeMap<String, SegmentTimeline>,
    overshadowed: FxHashSet<SegmentId>,
}

impl Snapshot {
    /// An empty snapshot stamped at `snapshot_time`
    pub fn empty(snapshot_time: Instant) -> Self {
        Self {
            snapshot_time,
            datasets: BTreeMap::new(),
            timelines: BTreeMap::new(),
            overshadowed: FxHashSet::default(),
        }
    }

    /// Build a snapshot from a flat collection of used segments.
    ///
    /// `snapshot_time` should be the instant the metadata poll began.
    /// Segments are grouped by dataset with identical identities
    /// deduplicated; any invariant violation aborts the whole build.
    pub fn from_segments<I>(segments: I, snapshot_time: Instant) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = SegmentDescriptor>,
    {
        let mut grouped: HashMap<String, DatasetSegments> = HashMap::new();
        for segment in segments {
            grouped
                .entry(segment.dataset.clone())
                .or_insert_with(|| DatasetSegments::new(segment.dataset.clone(), snapshot_time))
                .add_if_absent(Arc::new(segment));
        }
        Self::build(grouped, snapshot_time)
    }

    /// Build a snapshot from a pre-grouped per-dataset mapping.
    ///
    /// Each segment is attributed to the dataset it is grouped under;
    /// identical identities within a dataset are deduplicated.
    pub fn from_grouped(
        grouped: BTreeMap<String, Vec<SegmentDescriptor>>,
        snapshot_time: Instant,
    ) -> anyhow::Result<Self> {
        let mut datasets: HashMap<String, DatasetSegments> = HashMap::new();
        for (name, segments) in grouped {
            let dataset = datasets
                .entry(name.clone())
                .or_insert_with(|| DatasetSegments::new(name.clone(), snapshot_time));
            for segment in segments {
                dataset.add_if_absent(Arc::new(segment));
            }
        }
        Self::build(datasets, snapshot_time)
    }

    fn build(
        grouped: HashMap<String, DatasetSegments>,
        snapshot_time: Instant,
    ) -> anyhow::Result<Self> {
        let mut datasets = BTreeMap::new();
        let mut timelines = BTreeMap::new();
        for (name, dataset) in grouped {
            let timeline = SegmentTimeline::new();
            timeline.add_all(dataset.segments().cloned())?;
            timelines.insert(name.clone(), timeline);
            datasets.insert(name, dataset);
        }

        // Only a small fraction of a cluster's segments are expected to be
        // overshadowed at any instant, so one flat set holds them all.
        let mut overshadowed = FxHashSet::default();
        for (name, dataset) in &datasets {
            let timeline = &timelines[name];
            for segment in dataset.segments() {
                if timeline.is_overshadowed(segment) {
                    overshadowed.insert(segment.id());
                }
            }
        }

        debug!(
            datasets = datasets.len(),
            overshadowed = overshadowed.len(),
            "built snapshot"
        );
        Ok(Self {
            snapshot_time,
            datasets,
            timelines,
            overshadowed,
        })
    }

    /// The instant the metadata poll behind this snapshot began
    pub fn snapshot_time(&self) -> Instant {
        self.snapshot_time
    }

    /// One dataset's used segments, if the dataset is known
    pub fn dataset(&self, name: &str) -> Option<&DatasetSegments> {
        self.datasets.get(name)
    }

    /// All datasets in name order
    pub fn datasets(&self) -> impl Iterator<Item = &DatasetSegments> {
        self.datasets.values()
    }

    /// Per-dataset timelines
    pub fn timelines(&self) -> &BTreeMap<String, SegmentTimeline> {
        &self.timelines
    }

    /// One dataset's timeline, if the dataset is known
    pub fn timeline(&self, name: &str) -> Option<&SegmentTimeline> {
        self.timelines.get(name)
    }

    /// Identities of every segment superseded by newer complete versions,
    /// across all datasets
    pub fn overshadowed_segments(&self) -> &FxHashSet<SegmentId> {
        &self.overshadowed
    }

    /// Used segments of `dataset` that overlap `interval` and are not
    /// overshadowed, requiring complete partition sets. An unknown dataset
    /// yields an empty result.
    pub fn all_used_non_overshadowed(
        &self,
        dataset: &str,
        interval: Interval,
    ) -> Vec<Arc<SegmentDescriptor>> {
        match self.timelines.get(dataset) {
            Some(timeline) => {
                timeline.find_non_overshadowed_in_interval(interval, Completeness::RequireComplete)
            }
            None => Vec::new(),
        }
    }

    /// Lazily traverse every dataset's used segments, in unspecified order.
    ///
    /// Re-iterating is safe but walks every dataset again; consume the
    /// iterator once per use rather than re-deriving it.
    pub fn iter_all_used_segments(&self) -> impl Iterator<Item = &Arc<SegmentDescriptor>> {
        self.datasets.values().flat_map(|dataset| dataset.segments())
    }

    /// Total number of used segments across all datasets
    pub fn num_segments(&self) -> usize {
        self.datasets.values().map(|d| d.num_segments()).sum()
    }

    /// Read-only introspection dump for admin surfaces
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "snapshot_time": self.snapshot_time,
            "num_segments": self.num_segments(),
            "num_overshadowed": self.overshadowed.len(),
            "datasets": self
                .datasets
                .values()
                .map(|dataset| {
                    serde_json::json!({
                        "name": dataset.name(),
                        "num_segments": dataset.num_segments(),
                        "total_size_bytes": dataset.total_size_bytes(),
                        "properties": dataset.properties(),
                    })
                })
                .collect::<Vec<_>>(),
        })
    }
}

/// The process-wide published snapshot reference.
///
/// A refresh process builds a new [`Snapshot`] off the hot path, then swaps
/// it in with [`publish`](Self::publish); request handlers take the current
/// reference with [`load`](Self::load) and keep a fully consistent, frozen
/// view for as long as they hold the `Arc`, even while newer snapshots are
/// built and published underneath them.
#[derive(Debug)]
pub struct CurrentSnapshot {
    current: RwLock<Arc<Snapshot>>,
}

impl CurrentSnapshot {
    /// Create a holder seeded with an empty snapshot stamped at `seed_time`,
    /// so `load` is total from the start
    pub fn new(seed_time: Instant) -> Self {
        Self::with_snapshot(Arc::new(Snapshot::empty(seed_time)))
    }

    /// Create a holder starting from an existing snapshot
    pub fn with_snapshot(snapshot: Arc<Snapshot>) -> Self {
        Self {
            current: RwLock::new(snapshot),
        }
    }

    /// The currently published snapshot
    pub fn load(&self) -> Arc<Snapshot> {
        self.current.read().clone()
    }

    /// Atomically replace the published snapshot, returning the one it
    /// superseded. In-flight readers holding the old `Arc` are unaffected.
    pub fn publish(&self, snapshot: Arc<Snapshot>) -> Arc<Snapshot> {
        let mut current = self.current.write();
        std::mem::replace(&mut *current, snapshot)
    }
}
