//! Tests for snapshot construction and the publish/refresh cycle.
//!
//! The key properties tested:
//!
//! 1. Flat and pre-grouped construction produce the same aggregate, with
//!    identical segment identities deduplicated
//! 2. The global overshadowed set is computed eagerly and agrees with the
//!    per-timeline single-segment test for every used segment
//! 3. Monotonic overshadow - a segment overshadowed in one snapshot stays
//!    overshadowed in later snapshots while its interval is untouched
//! 4. Publication is atomic replacement: a failed rebuild never replaces the
//!    published snapshot, and in-flight readers keep their frozen view

use std::collections::BTreeMap;

use tideline::{
    Catalog, CatalogConfig, Interval, SegmentDescriptor, ShardSpec, Snapshot,
};

fn segment(dataset: &str, interval: (i64, i64), version: &str) -> SegmentDescriptor {
    SegmentDescriptor::new(
        dataset,
        Interval::new(interval.0, interval.1).unwrap(),
        version,
        ShardSpec::Single,
        0,
    )
    .with_size_bytes(1024)
}

fn base_segments() -> Vec<SegmentDescriptor> {
    vec![
        segment("pageviews", (0, 100), "v1"),
        segment("pageviews", (0, 100), "v2"),
        segment("pageviews", (100, 200), "v1"),
        segment("clicks", (0, 100), "v1"),
    ]
}

#[test]
fn flat_and_grouped_construction_agree() {
    let flat = Snapshot::from_segments(base_segments(), 1000).unwrap();

    let mut grouped: BTreeMap<String, Vec<SegmentDescriptor>> = BTreeMap::new();
    for segment in base_segments() {
        grouped
            .entry(segment.dataset.clone())
            .or_default()
            .push(segment);
    }
    let pre_grouped = Snapshot::from_grouped(grouped, 1000).unwrap();

    assert_eq!(flat.num_segments(), pre_grouped.num_segments());
    assert_eq!(
        flat.overshadowed_segments(),
        pre_grouped.overshadowed_segments()
    );
    let names: Vec<&str> = flat.datasets().map(|d| d.name()).collect();
    assert_eq!(names, vec!["clicks", "pageviews"]);
}

#[test]
fn duplicate_identities_are_deduplicated() {
    let mut segments = base_segments();
    segments.extend(base_segments()); // every identity twice
    let snapshot = Snapshot::from_segments(segments, 1000).unwrap();

    assert_eq!(snapshot.num_segments(), 4);
    assert_eq!(snapshot.iter_all_used_segments().count(), 4);
}

#[test]
fn overshadowed_set_agrees_with_single_segment_test() {
    let snapshot = Snapshot::from_segments(base_segments(), 1000).unwrap();

    // Exactly the fully replaced pageviews v1 chunk
    let overshadowed = snapshot.overshadowed_segments();
    assert_eq!(overshadowed.len(), 1);
    assert!(overshadowed.contains(&base_segments()[0].id()));

    for segment in snapshot.iter_all_used_segments() {
        let timeline = snapshot.timeline(&segment.dataset).unwrap();
        assert_eq!(
            timeline.is_overshadowed(segment),
            overshadowed.contains(&segment.id()),
            "disagreement for {}",
            segment.id()
        );
    }
}

#[test]
fn routing_surface_returns_visible_segments_only() {
    let snapshot = Snapshot::from_segments(base_segments(), 1000).unwrap();

    let visible =
        snapshot.all_used_non_overshadowed("pageviews", Interval::new(0, 200).unwrap());
    let ids: Vec<String> = visible.iter().map(|s| s.id().to_string()).collect();
    assert_eq!(
        ids,
        vec![
            "pageviews_0_100_v2_0".to_string(),
            "pageviews_100_200_v1_0".to_string(),
        ]
    );

    // No-segment cases are empty results, not errors
    assert!(snapshot
        .all_used_non_overshadowed("pageviews", Interval::new(500, 600).unwrap())
        .is_empty());
    assert!(snapshot
        .all_used_non_overshadowed("unknown", Interval::new(0, 100).unwrap())
        .is_empty());
}

#[test]
fn overshadow_is_monotonic_across_snapshots() {
    let replaced = base_segments()[0].id();

    let first = Snapshot::from_segments(base_segments(), 1000).unwrap();
    assert!(first.overshadowed_segments().contains(&replaced));

    // Later polls see more data elsewhere, nothing touching [0, 100)
    let mut grown = base_segments();
    grown.push(segment("pageviews", (200, 300), "v1"));
    grown.push(segment("impressions", (0, 100), "v1"));
    let second = Snapshot::from_segments(grown.clone(), 2000).unwrap();
    assert!(second.overshadowed_segments().contains(&replaced));

    grown.push(segment("pageviews", (300, 400), "v4"));
    let third = Snapshot::from_segments(grown, 3000).unwrap();
    assert!(third.overshadowed_segments().contains(&replaced));
}

#[test]
fn refresh_cycle_publishes_and_survives_bad_polls() {
    let catalog = Catalog::new(CatalogConfig::default());
    catalog.rebuild_from(base_segments(), 1000).unwrap();

    // A reader takes the current snapshot and holds it across refreshes
    let held = catalog.current();
    assert_eq!(held.snapshot_time(), 1000);

    // A poisoned poll: a partition number outside its declared shard space
    let mut poisoned = base_segments();
    poisoned.push(SegmentDescriptor::new(
        "pageviews",
        Interval::new(200, 300).unwrap(),
        "v1",
        ShardSpec::Linear { partitions: 2 },
        9,
    ));
    assert!(catalog.rebuild_from(poisoned, 2000).is_err());

    // The failed build replaced nothing
    assert_eq!(catalog.current().snapshot_time(), 1000);

    // A good poll publishes, and the held reader still sees its frozen view
    let mut next = base_segments();
    next.push(segment("clicks", (100, 200), "v1"));
    catalog.rebuild_from(next, 3000).unwrap();
    assert_eq!(catalog.current().snapshot_time(), 3000);
    assert_eq!(catalog.current().num_segments(), 5);
    assert_eq!(held.snapshot_time(), 1000);
    assert_eq!(held.num_segments(), 4);
}

#[test]
fn admin_dump_reflects_datasets_and_time() {
    let snapshot = Snapshot::from_segments(base_segments(), 1000).unwrap();
    assert_eq!(snapshot.snapshot_time(), 1000);

    let pageviews = snapshot.dataset("pageviews").unwrap();
    assert_eq!(pageviews.num_segments(), 3);
    assert_eq!(pageviews.total_size_bytes(), 3 * 1024);
    assert_eq!(pageviews.properties()["created"], "1000");

    let summary = snapshot.summary();
    assert_eq!(summary["num_segments"], 4);
    assert_eq!(summary["num_overshadowed"], 1);
    assert_eq!(summary["datasets"][1]["name"], "pageviews");
}
