//! # Catalog Module
//!
//! The context object request handling runs against: it owns the published
//! snapshot reference and the refresh configuration. A refresh process calls
//! [`Catalog::rebuild_from`] with each metadata poll's segment batch; the new
//! snapshot is built entirely off the hot path and published only on success,
//! so a failed build leaves the previously published snapshot current and in
//! use. Readers call [`Catalog::current`] and never block on a rebuild.

use crate::config::CatalogConfig;
use crate::model::SegmentDescriptor;
use crate::snapshot::{CurrentSnapshot, Snapshot};
use crate::temporal::{Instant, Interval};
use crate::timeline::TimelineSlice;
use std::collections::BTreeMap;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, instrument, warn};

/// Current UTC time as epoch milliseconds
fn now_millis() -> Instant {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as Instant
}

/// Owns the process-wide published snapshot and the refresh configuration
#[derive(Debug)]
pub struct Catalog {
    current: CurrentSnapshot,
    config: CatalogConfig,
}

impl Catalog {
    /// Create a catalog seeded with an empty snapshot
    pub fn new(config: CatalogConfig) -> Self {
        Self {
            current: CurrentSnapshot::new(now_millis()),
            config,
        }
    }

    /// The refresh configuration
    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    /// The currently published snapshot. The returned reference stays a
    /// fully consistent, frozen view even while newer snapshots are
    /// published underneath it.
    pub fn current(&self) -> Arc<Snapshot> {
        self.current.load()
    }

    /// Build a snapshot from a flat used-segment batch and publish it.
    ///
    /// `poll_started_at` should be the instant the metadata poll began; it
    /// becomes the snapshot time. In strict mode any malformed descriptor
    /// aborts the build; otherwise descriptors that fail standalone
    /// validation are skipped with a warning (cross-segment identity
    /// conflicts still abort — dropping an arbitrary side of a conflict
    /// would publish data the metadata store does not agree on).
    ///
    /// On failure the previously published snapshot remains current.
    #[instrument(skip_all, fields(poll_started_at))]
    pub fn rebuild_from<I>(
        &self,
        segments: I,
        poll_started_at: Instant,
    ) -> anyhow::Result<Arc<Snapshot>>
    where
        I: IntoIterator<Item = SegmentDescriptor>,
    {
        let segments = if self.config.strict {
            segments.into_iter().collect()
        } else {
            self.drop_malformed(segments)
        };

        let snapshot = Arc::new(Snapshot::from_segments(segments, poll_started_at)?);
        self.publish(snapshot.clone());
        Ok(snapshot)
    }

    /// Build a snapshot from a pre-grouped per-dataset mapping and publish it
    #[instrument(skip_all, fields(poll_started_at))]
    pub fn rebuild_from_grouped(
        &self,
        grouped: BTreeMap<String, Vec<SegmentDescriptor>>,
        poll_started_at: Instant,
    ) -> anyhow::Result<Arc<Snapshot>> {
        let grouped = if self.config.strict {
            grouped
        } else {
            grouped
                .into_iter()
                .map(|(name, segments)| (name, self.drop_malformed(segments)))
                .collect()
        };

        let snapshot = Arc::new(Snapshot::from_grouped(grouped, poll_started_at)?);
        self.publish(snapshot.clone());
        Ok(snapshot)
    }

    /// Resolve the visible timeline slices for one dataset over an interval,
    /// using the configured default completeness mode. An unknown dataset
    /// yields an empty result.
    pub fn visible_slices(&self, dataset: &str, interval: Interval) -> Vec<TimelineSlice> {
        match self.current().timeline(dataset) {
            Some(timeline) => timeline.lookup(interval, self.config.default_completeness),
            None => Vec::new(),
        }
    }

    fn publish(&self, snapshot: Arc<Snapshot>) {
        let replaced = self.current.publish(snapshot.clone());
        debug!(
            snapshot_time = snapshot.snapshot_time(),
            replaced_time = replaced.snapshot_time(),
            segments = snapshot.num_segments(),
            "published snapshot"
        );
    }

    /// Drop descriptors that fail standalone shard validation
    fn drop_malformed<I>(&self, segments: I) -> Vec<SegmentDescriptor>
    where
        I: IntoIterator<Item = SegmentDescriptor>,
    {
        segments
            .into_iter()
            .filter(|segment| {
                match segment
                    .shard_spec
                    .create_chunk(Arc::new(segment.clone()))
                {
                    Ok(_) => true,
                    Err(err) => {
                        warn!(segment = %segment.id(), error = %err, "dropping malformed segment descriptor");
                        false
                    }
                }
            })
            .collect()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new(CatalogConfig::default())
    }
}
