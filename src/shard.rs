//! # Shard Module
//!
//! Shard specs describe how one version's data for one interval is divided
//! into partitions and when a set of partitions is complete. Partition chunks
//! bind a segment payload to its partition identity within that space.
//!
//! Dispatch is by enum tag with a per-variant comparator; completeness and
//! ordering never rely on runtime polymorphism.

use crate::model::SegmentDescriptor;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;

/// How one (interval, version) pair's data is partitioned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShardSpec {
    /// A single partition holding all of the version's data
    Single,
    /// Numbered partitions 0..partitions-1
    Linear {
        /// Declared core partition count
        partitions: u32,
    },
    /// Hash-assigned numbered partitions 0..partitions-1
    Hash {
        /// Declared core partition count
        partitions: u32,
    },
    /// Partitions split by ordered key boundaries. `boundaries` holds the
    /// interior split points; partition 0 starts at the open lower bound and
    /// the last partition ends at the open upper bound.
    Range {
        /// Interior key boundaries, strictly ascending
        boundaries: Vec<String>,
    },
}

impl ShardSpec {
    /// Declared partition count of this spec's partition space
    pub fn partitions(&self) -> u32 {
        match self {
            ShardSpec::Single => 1,
            ShardSpec::Linear { partitions } | ShardSpec::Hash { partitions } => *partitions,
            ShardSpec::Range { boundaries } => boundaries.len() as u32 + 1,
        }
    }

    /// Validate the spec's declared partition space
    fn validate(&self) -> anyhow::Result<()> {
        match self {
            ShardSpec::Single => Ok(()),
            ShardSpec::Linear { partitions } | ShardSpec::Hash { partitions } => {
                if *partitions == 0 {
                    anyhow::bail!("Shard spec declares zero partitions");
                }
                Ok(())
            }
            ShardSpec::Range { boundaries } => {
                for pair in boundaries.windows(2) {
                    if pair[0] >= pair[1] {
                        anyhow::bail!(
                            "Malformed range boundaries: {:?} does not precede {:?}",
                            pair[0],
                            pair[1]
                        );
                    }
                }
                Ok(())
            }
        }
    }

    /// Bind a segment payload to its partition identity within this spec.
    ///
    /// # Errors
    /// Fails when the payload's partition number falls outside the declared
    /// partition space, or when a range spec's boundary chain is malformed.
    pub fn create_chunk(&self, payload: Arc<SegmentDescriptor>) -> anyhow::Result<PartitionChunk> {
        self.validate()?;
        let partition = payload.partition;
        if partition >= self.partitions() {
            anyhow::bail!(
                "Partition number {} outside declared space of {} partitions for segment {}",
                partition,
                self.partitions(),
                payload.id()
            );
        }

        let range = match self {
            ShardSpec::Range { boundaries } => {
                let index = partition as usize;
                Some(KeyRange {
                    start: (index > 0).then(|| boundaries[index - 1].clone()),
                    end: boundaries.get(index).cloned(),
                })
            }
            _ => None,
        };

        Ok(PartitionChunk {
            partition,
            range,
            payload,
        })
    }

    /// Whether `chunks` exactly tiles this spec's declared partition space.
    ///
    /// Numbered specs are complete iff the present partition numbers are
    /// exactly `{0 .. partitions-1}`. Range specs are complete iff the chunks,
    /// sorted by range start, run from the open lower bound to the open upper
    /// bound with each chunk's end meeting the next chunk's start.
    pub fn is_complete(&self, chunks: &[PartitionChunk]) -> bool {
        match self {
            ShardSpec::Single => chunks.len() == 1 && chunks[0].partition == 0,
            ShardSpec::Linear { partitions } | ShardSpec::Hash { partitions } => {
                chunks.len() == *partitions as usize
                    && chunks
                        .iter()
                        .enumerate()
                        .all(|(i, chunk)| chunk.partition == i as u32)
            }
            ShardSpec::Range { .. } => {
                if chunks.len() != self.partitions() as usize {
                    return false;
                }
                // Chunks arrive sorted by range start (see PartitionChunk ordering).
                let mut previous_end: Option<&Option<String>> = None;
                for chunk in chunks {
                    let Some(range) = &chunk.range else {
                        return false;
                    };
                    match previous_end {
                        None => {
                            if range.start.is_some() {
                                return false; // gap before the first chunk
                            }
                        }
                        Some(end) => {
                            if *end != range.start {
                                return false; // gap or overlap between neighbors
                            }
                        }
                    }
                    previous_end = Some(&range.end);
                }
                matches!(previous_end, Some(None))
            }
        }
    }
}

/// The key span a range-partitioned chunk covers. `None` bounds are open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    /// Inclusive lower key, open when None
    pub start: Option<String>,
    /// Exclusive upper key, open when None
    pub end: Option<String>,
}

/// A segment payload tagged with its partition identity within one
/// (interval, version) entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionChunk {
    /// Partition number within the shard space
    pub partition: u32,
    /// Key range for range-partitioned chunks
    pub range: Option<KeyRange>,
    /// The segment this chunk carries
    pub payload: Arc<SegmentDescriptor>,
}

impl PartialOrd for PartitionChunk {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PartitionChunk {
    fn cmp(&self, other: &Self) -> Ordering {
        match (&self.range, &other.range) {
            // Range chunks order by range start (open bound first), with the
            // partition number as a deterministic tie-break.
            (Some(a), Some(b)) => a
                .start
                .cmp(&b.start)
                .then_with(|| self.partition.cmp(&other.partition)),
            _ => self.partition.cmp(&other.partition),
        }
    }
}

/// The set of partition chunks currently known for one (interval, version)
/// entry, kept in chunk order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionSet {
    chunks: Vec<PartitionChunk>,
}

impl PartitionSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self { chunks: Vec::new() }
    }

    /// Insert a chunk, keeping the set ordered.
    ///
    /// Returns `Ok(true)` when the chunk was inserted and `Ok(false)` when an
    /// identical chunk was already present (re-adding is a no-op).
    ///
    /// # Errors
    /// Fails when the chunk's partition number is already occupied by a
    /// different payload; the set is left unchanged.
    pub fn insert(&mut self, chunk: PartitionChunk) -> anyhow::Result<bool> {
        if let Some(existing) = self.chunks.iter().find(|c| c.partition == chunk.partition) {
            if existing.payload == chunk.payload {
                return Ok(false);
            }
            anyhow::bail!(
                "Partition number {} already occupied by segment {} (rejected segment {})",
                chunk.partition,
                existing.payload.id(),
                chunk.payload.id()
            );
        }

        let position = self
            .chunks
            .binary_search(&chunk)
            .unwrap_or_else(|position| position);
        self.chunks.insert(position, chunk);
        Ok(true)
    }

    /// Remove the chunk occupying `partition`, if its payload matches
    pub fn remove(&mut self, partition: u32, payload: &SegmentDescriptor) -> Option<PartitionChunk> {
        let index = self
            .chunks
            .iter()
            .position(|c| c.partition == partition && c.payload.as_ref() == payload)?;
        Some(self.chunks.remove(index))
    }

    /// Chunks in deterministic order
    pub fn iter(&self) -> impl Iterator<Item = &PartitionChunk> {
        self.chunks.iter()
    }

    /// Chunks as an ordered slice
    pub fn as_slice(&self) -> &[PartitionChunk] {
        &self.chunks
    }

    /// Number of chunks present
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether no chunks are present
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}
