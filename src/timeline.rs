//! # Timeline Module
//!
//! The per-dataset versioned interval index. A timeline maps intervals to
//! versioned partition-chunk entries, answers "what is visible now" for a
//! query interval, and identifies entries permanently superseded by newer,
//! complete versions.
//!
//! Mutation and reads go through an internal read-write lock so a reader
//! always observes an entry's chunk set either before or after a mutation,
//! never mid-update.

use crate::model::{SegmentDescriptor, SegmentId, Version};
use crate::shard::{PartitionChunk, PartitionSet, ShardSpec};
use crate::temporal::{atomic_intervals, Interval};
use parking_lot::RwLock;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Whether visibility queries may consider entries with incomplete
/// partition sets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Completeness {
    /// Only entries whose partition set tiles the declared shard space
    #[default]
    RequireComplete,
    /// Complete entries are still preferred, but an atom covered only by
    /// incomplete entries falls back to the highest version available there
    AllowIncomplete,
}

/// One (interval, version) entry: the chunks currently known for that exact
/// pair, plus the shard spec they are measured against.
#[derive(Debug, Clone)]
struct TimelineEntry {
    shard_spec: ShardSpec,
    chunks: PartitionSet,
    complete: bool,
}

impl TimelineEntry {
    fn refresh_completeness(&mut self) {
        self.complete = self.shard_spec.is_complete(self.chunks.as_slice());
    }
}

/// A resolved slice of the timeline: one covered sub-interval and the chunk
/// set of the entry visible there.
#[derive(Debug, Clone)]
pub struct TimelineSlice {
    /// The covered sub-interval (clamped to the query interval)
    pub interval: Interval,
    /// Version of the winning entry
    pub version: Version,
    /// The winning entry's chunks, in chunk order
    pub chunks: Vec<PartitionChunk>,
}

#[derive(Debug, Default)]
struct TimelineInner {
    /// interval -> version -> entry; both maps ordered
    entries: BTreeMap<Interval, BTreeMap<Version, TimelineEntry>>,
    num_chunks: usize,
}

impl TimelineInner {
    /// The direct pairwise overshadow rule: (interval, version) is
    /// overshadowed iff some entry at (interval', version') has
    /// version' > version, interval' ⊇ interval, and a complete chunk set.
    ///
    /// Deliberately not a transitive closure: an entry is only reported when
    /// a single covering entry satisfies the rule on its own. Retention logic
    /// deletes what this reports, so the relation must not be widened.
    fn is_overshadowed(&self, interval: &Interval, version: &Version) -> bool {
        self.entries.iter().any(|(other, versions)| {
            other.encloses(interval)
                && versions
                    .iter()
                    .any(|(other_version, entry)| other_version > version && entry.complete)
        })
    }

    /// Segment ids of every chunk belonging to an overshadowed entry
    fn overshadowed_ids(&self) -> FxHashSet<SegmentId> {
        let mut ids = FxHashSet::default();
        for (interval, versions) in &self.entries {
            for (version, entry) in versions {
                if self.is_overshadowed(interval, version) {
                    ids.extend(entry.chunks.iter().map(|chunk| chunk.payload.id()));
                }
            }
        }
        ids
    }
}

/// Authoritative per-dataset index from intervals to versioned
/// partition-chunk entries.
///
/// Supports overlapping intervals and multiple versions per interval; answers
/// visibility (`lookup`) and overshadow queries. Incremental `add`/`remove`
/// come from targeted single-segment updates between full snapshot rebuilds.
#[derive(Debug, Default)]
pub struct SegmentTimeline {
    inner: RwLock<TimelineInner>,
}

impl SegmentTimeline {
    /// Create an empty timeline
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert one segment into its (interval, version) entry, creating the
    /// entry if absent.
    ///
    /// Re-adding an identical segment is a no-op. Adding a different payload
    /// under an occupied partition number, or a partition number outside the
    /// declared shard space, is an invariant violation: the error is returned
    /// and the timeline is left exactly as it was.
    pub fn add(&self, segment: Arc<SegmentDescriptor>) -> anyhow::Result<()> {
        // Validate before taking the write lock; a failed add must have no
        // partial effect.
        let chunk = segment.shard_spec.create_chunk(segment.clone())?;
        let interval = segment.interval;
        let version = segment.version.clone();

        let mut inner = self.inner.write();
        let versions = inner.entries.entry(interval).or_default();
        let inserted = match versions.get_mut(&version) {
            Some(entry) => {
                // A failed insert leaves the chunk set untouched, and the
                // entry predates this call, so there is nothing to clean up.
                let inserted = entry.chunks.insert(chunk)?;
                if inserted {
                    entry.refresh_completeness();
                }
                inserted
            }
            None => {
                let mut entry = TimelineEntry {
                    shard_spec: segment.shard_spec.clone(),
                    chunks: PartitionSet::new(),
                    complete: false,
                };
                entry
                    .chunks
                    .insert(chunk)
                    .expect("first chunk of a fresh entry cannot conflict");
                entry.refresh_completeness();
                versions.insert(version, entry);
                true
            }
        };

        if inserted {
            inner.num_chunks += 1;
            debug!(segment = %segment.id(), "added segment to timeline");
        }
        Ok(())
    }

    /// Insert a batch of segments, stopping at the first invariant violation
    pub fn add_all<I>(&self, segments: I) -> anyhow::Result<()>
    where
        I: IntoIterator<Item = Arc<SegmentDescriptor>>,
    {
        for segment in segments {
            self.add(segment)?;
        }
        Ok(())
    }

    /// Remove one segment's chunk from its entry. An entry whose chunk set
    /// empties is deleted outright, as is an interval left with no versions.
    ///
    /// Returns whether anything was removed; a missing segment is a normal
    /// case, not an error.
    pub fn remove(&self, segment: &SegmentDescriptor) -> bool {
        let mut inner = self.inner.write();
        let Some(versions) = inner.entries.get_mut(&segment.interval) else {
            return false;
        };

        let entry_emptied = {
            let Some(entry) = versions.get_mut(&segment.version) else {
                return false;
            };
            if entry.chunks.remove(segment.partition, segment).is_none() {
                return false;
            }
            if entry.chunks.is_empty() {
                true
            } else {
                entry.refresh_completeness();
                false
            }
        };

        if entry_emptied {
            versions.remove(&segment.version);
        }
        if versions.is_empty() {
            inner.entries.remove(&segment.interval);
        }
        inner.num_chunks -= 1;
        debug!(segment = %segment.id(), "removed segment from timeline");
        true
    }

    /// Resolve the query interval into an ordered, gap-free, overlap-free
    /// sequence of visible slices.
    ///
    /// The query interval is partitioned into atomic sub-intervals at every
    /// overlapping entry boundary. Each atom selects the highest version
    /// whose entry is complete and covers the atom; under
    /// [`Completeness::AllowIncomplete`] an atom with no complete cover falls
    /// back to the highest version available there. Adjacent atoms resolved
    /// to the same entry are merged, so the result covers exactly the
    /// portion of the query interval for which an eligible entry exists.
    pub fn lookup(&self, query: Interval, completeness: Completeness) -> Vec<TimelineSlice> {
        let inner = self.inner.read();

        let clamped: Vec<Interval> = inner
            .entries
            .keys()
            .filter_map(|interval| interval.intersect(&query))
            .collect();
        let atoms = atomic_intervals(&clamped);

        let mut slices: Vec<TimelineSlice> = Vec::new();
        let mut current_entry: Option<(Interval, Version)> = None;

        for atom in atoms {
            let winner = Self::resolve_atom(&inner, &atom, completeness);
            let Some((entry_interval, version, entry)) = winner else {
                current_entry = None;
                continue;
            };

            let same_entry = current_entry
                .as_ref()
                .is_some_and(|(i, v)| *i == entry_interval && *v == version);
            if same_entry {
                if let Some(last) = slices.last_mut() {
                    if last.interval.end == atom.start {
                        last.interval.end = atom.end;
                        continue;
                    }
                }
            }

            slices.push(TimelineSlice {
                interval: atom,
                version: version.clone(),
                chunks: entry.chunks.as_slice().to_vec(),
            });
            current_entry = Some((entry_interval, version));
        }

        slices
    }

    /// Pick the winning entry for one atomic sub-interval
    fn resolve_atom<'a>(
        inner: &'a TimelineInner,
        atom: &Interval,
        completeness: Completeness,
    ) -> Option<(Interval, Version, &'a TimelineEntry)> {
        let mut best_complete: Option<(Interval, &Version, &TimelineEntry)> = None;
        let mut best_any: Option<(Interval, &Version, &TimelineEntry)> = None;

        for (interval, versions) in &inner.entries {
            if !interval.encloses(atom) {
                continue;
            }
            for (version, entry) in versions {
                if entry.complete
                    && best_complete
                        .as_ref()
                        .is_none_or(|(_, best, _)| version > *best)
                {
                    best_complete = Some((*interval, version, entry));
                }
                if best_any.as_ref().is_none_or(|(_, best, _)| version > *best) {
                    best_any = Some((*interval, version, entry));
                }
            }
        }

        let winner = match completeness {
            Completeness::RequireComplete => best_complete,
            Completeness::AllowIncomplete => best_complete.or(best_any),
        };
        winner.map(|(interval, version, entry)| (interval, version.clone(), entry))
    }

    /// All chunks belonging to permanently superseded entries.
    ///
    /// An entry at (I, v) is overshadowed iff another entry at (I', v') in
    /// this timeline has v' > v, I' ⊇ I, and a complete chunk set. The test
    /// is direct and pairwise, never a closure across chains of partially
    /// overlapping versions.
    pub fn find_fully_overshadowed(&self) -> Vec<PartitionChunk> {
        let inner = self.inner.read();
        let mut chunks = Vec::new();
        for (interval, versions) in &inner.entries {
            for (version, entry) in versions {
                if inner.is_overshadowed(interval, version) {
                    chunks.extend(entry.chunks.iter().cloned());
                }
            }
        }
        chunks
    }

    /// Test a single segment against the overshadow rule
    pub fn is_overshadowed(&self, segment: &SegmentDescriptor) -> bool {
        self.inner
            .read()
            .is_overshadowed(&segment.interval, &segment.version)
    }

    /// Segments of entries intersecting `interval` that survive the
    /// overshadow filter. Under [`Completeness::RequireComplete`], chunks of
    /// incomplete entries are dropped as well.
    pub fn find_non_overshadowed_in_interval(
        &self,
        interval: Interval,
        completeness: Completeness,
    ) -> Vec<Arc<SegmentDescriptor>> {
        let inner = self.inner.read();
        let overshadowed = inner.overshadowed_ids();

        let mut result = Vec::new();
        for (entry_interval, versions) in &inner.entries {
            if !entry_interval.overlaps(&interval) {
                continue;
            }
            for entry in versions.values() {
                if completeness == Completeness::RequireComplete && !entry.complete {
                    continue;
                }
                for chunk in entry.chunks.iter() {
                    if !overshadowed.contains(&chunk.payload.id()) {
                        result.push(chunk.payload.clone());
                    }
                }
            }
        }
        result
    }

    /// Whether the timeline holds no entries
    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }

    /// Total number of chunks across all entries
    pub fn num_segments(&self) -> usize {
        self.inner.read().num_chunks
    }

    /// Every chunk in the timeline, in entry order. Collected under the read
    /// lock; intended for introspection, not hot paths.
    pub fn all_chunks(&self) -> Vec<PartitionChunk> {
        let inner = self.inner.read();
        inner
            .entries
            .values()
            .flat_map(|versions| versions.values())
            .flat_map(|entry| entry.chunks.iter().cloned())
            .collect()
    }
}
