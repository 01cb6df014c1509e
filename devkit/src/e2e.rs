//! Tests de bout en bout : source simulée -> scheduler -> snapshot publié

use crate::fixtures::{FeedBuilder, MetadataBuilder};
use crate::source_stub::Failure;
use crate::test_utils::TestHarness;
use netmap_kernel::config::KernelConfig;
use netmap_kernel::scheduler::CycleError;
use netmap_kernel::{Phase, TriggerOutcome, Verdict};
use std::sync::Arc;

fn campus_metadata() -> Vec<u8> {
    MetadataBuilder::new()
        .site("Hall A", 42.3366, -71.0907, "A")
        .site("Hall B", 42.3384, -71.0882, "B")
        .site("Hall A+B", 42.3390, -71.0890, "A, B")
        .site_without_devices("Parking", 42.3400, -71.0900)
        .build()
        .unwrap()
}

fn reference_feed() -> String {
    FeedBuilder::new()
        .device("A", "closet a", "d1", "up")
        .device("A", "closet a", "d2", "down")
        .device("B", "closet b", "d3", "unknown")
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_reference_feed_end_to_end() {
    let mut harness = TestHarness::new(reference_feed(), campus_metadata());
    harness.cycle().await.unwrap();

    let snapshot = harness.snapshot();
    let a: Vec<_> = snapshot.locations.get("A").unwrap().iter().map(|d| d.device_id.clone()).collect();
    let b: Vec<_> = snapshot.locations.get("B").unwrap().iter().map(|d| d.device_id.clone()).collect();
    assert_eq!(a, vec!["d1", "d2"]);
    assert_eq!(b, vec!["d3"]);
    assert!(snapshot.errors.is_empty());
    harness.assert_counters(0, 1, 1).unwrap();
    harness.assert_consistent().unwrap();

    let sites: Vec<_> = snapshot.sites.iter().map(|s| (s.title.as_str(), s.verdict)).collect();
    assert_eq!(
        sites,
        vec![
            ("Hall A", Verdict::Unhealthy),
            ("Hall B", Verdict::Unknown),
            ("Hall A+B", Verdict::Unhealthy),
            ("Parking", Verdict::Unknown),
        ]
    );
}

#[tokio::test]
async fn test_malformed_rows_and_timestamp() {
    let feed = FeedBuilder::new()
        .timestamp("2024-03-01 10:15")
        .device("A", "closet a", "d1", "up")
        .raw(&["A", "", "d2", "down"])
        .raw(&["C", "closet c", "d4", ""])
        .raw(&["", "orphan", "d5", "up"])
        .build()
        .unwrap();
    let mut harness = TestHarness::new(feed, campus_metadata());
    harness.cycle().await.unwrap();

    let snapshot = harness.snapshot();
    assert_eq!(snapshot.errors.len(), 3);
    assert_eq!(snapshot.locations.get("A").unwrap().len(), 1);
    harness.assert_verdict("A", Verdict::Healthy).unwrap();
    harness.assert_verdict("C", Verdict::Unknown).unwrap();
    harness.assert_counters(1, 0, 0).unwrap();

    let summary = harness.summary_json().unwrap();
    assert_eq!(summary["freshness"], "(Newest Data: 2024-03-01 10:15)");
    assert_eq!(summary["errors"], 3);
}

#[tokio::test]
async fn test_keys_absent_from_feed_are_unknown() {
    let feed = FeedBuilder::new().device("A", "closet a", "d1", "up").build().unwrap();
    let mut harness = TestHarness::new(feed, campus_metadata());
    harness.cycle().await.unwrap();

    harness.assert_verdict("B", Verdict::Unknown).unwrap();
    harness.assert_verdict("ZZ", Verdict::Unknown).unwrap();
    let snapshot = harness.snapshot();
    assert_eq!(snapshot.sites[1].verdict, Verdict::Unknown);
    // B inconnu du flux : n'entre pas dans les compteurs
    harness.assert_counters(1, 0, 0).unwrap();
}

#[tokio::test]
async fn test_rebuild_is_idempotent() {
    let mut harness = TestHarness::new(reference_feed(), campus_metadata());
    harness.cycle().await.unwrap();
    let first = harness.snapshot();
    harness.cycle().await.unwrap();
    let second = harness.snapshot();

    assert_eq!(second.version, first.version + 1);
    assert_eq!(first.locations, second.locations);
    assert_eq!(first.counters, second.counters);
    assert_eq!(first.sites, second.sites);
    // pas d'accumulation d'un cycle à l'autre
    assert_eq!(second.locations.device_count(), 3);
}

#[tokio::test]
async fn test_fetch_failures_keep_last_good_snapshot() {
    let mut harness = TestHarness::new(reference_feed(), campus_metadata());
    harness.cycle().await.unwrap();
    let good = harness.snapshot();

    harness.source.fail(Failure::Feed);
    assert!(harness.cycle().await.is_err());
    harness.source.fail(Failure::Metadata);
    let err = harness.cycle().await.unwrap_err();
    assert!(matches!(err.downcast_ref::<CycleError>(), Some(CycleError::Fetch(_))));

    assert!(Arc::ptr_eq(&good, &harness.snapshot()));
    let status = harness.control.status();
    assert_eq!(status.cycles_failed, 2);
    assert_eq!(status.consecutive_failures, 2);
    assert_eq!(status.phase, Phase::Idle);

    harness.source.recover();
    assert_eq!(harness.cycle().await.unwrap(), 2);
}

#[tokio::test]
async fn test_query_shape_failure_keeps_snapshot() {
    let mut harness = TestHarness::new(reference_feed(), campus_metadata());
    harness.cycle().await.unwrap();

    harness.source.set_metadata(MetadataBuilder::wrong_layout().unwrap());
    let err = harness.cycle().await.unwrap_err();
    assert!(matches!(err.downcast_ref::<CycleError>(), Some(CycleError::Metadata(_))));
    assert_eq!(harness.snapshot().version, 1);
    harness.assert_counters(0, 1, 1).unwrap();
}

#[tokio::test]
async fn test_readers_never_see_a_mix() {
    let mut harness = TestHarness::new(reference_feed(), campus_metadata());
    harness.cycle().await.unwrap();
    let old = harness.snapshot();

    let feed = FeedBuilder::new()
        .device("A", "closet a", "d1", "up")
        .device("A", "closet a", "d2", "up")
        .device("B", "closet b", "d3", "up")
        .build()
        .unwrap();
    harness.source.set_feed(feed);
    harness.cycle().await.unwrap();
    let new = harness.snapshot();

    assert!(old.is_consistent() && new.is_consistent());
    assert_eq!(old.verdict("A"), Verdict::Unhealthy);
    assert_eq!(old.counters.unhealthy, 1);
    assert_eq!(new.verdict("A"), Verdict::Healthy);
    assert_eq!(new.counters.healthy, 2);
}

#[tokio::test]
async fn test_manual_trigger_mid_cycle_is_ignored() {
    let mut harness = TestHarness::with_config(
        KernelConfig { refresh_interval_secs: 3600, ..KernelConfig::default() },
        reference_feed(),
        campus_metadata(),
    );
    let mut versions = harness.subscribe();
    harness.source.hold_next_feed();
    harness.start().unwrap();

    harness.source.wait_until_held().await;
    assert_eq!(harness.control.phase(), Phase::Fetching);
    assert_eq!(harness.control.trigger(), TriggerOutcome::Ignored);
    assert_eq!(harness.control.trigger(), TriggerOutcome::Ignored);
    harness.source.release_feed();

    versions.changed().await.unwrap();
    assert_eq!(*versions.borrow_and_update(), 1);
    harness.stop().await.unwrap();

    assert_eq!(harness.source.feed_fetches(), 1);
    assert_eq!(*versions.borrow(), 1);
    assert_eq!(harness.control.status().cycles_completed, 1);
}

#[tokio::test]
async fn test_manual_trigger_while_idle_cuts_countdown() {
    let mut harness = TestHarness::with_config(
        KernelConfig { refresh_interval_secs: 3600, ..KernelConfig::default() },
        reference_feed(),
        campus_metadata(),
    );
    harness.start().unwrap();
    harness.wait_for_version(1, 5000).await.unwrap();
    assert!(harness.control.status().seconds_until_next.unwrap() > 3000);

    harness.source.set_feed(FeedBuilder::new().device("A", "closet a", "d1", "up").build().unwrap());
    assert_eq!(harness.control.trigger(), TriggerOutcome::Accepted);
    harness.wait_for_version(2, 5000).await.unwrap();
    harness.assert_counters(1, 0, 0).unwrap();

    harness.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reader_task_sees_whole_snapshots_across_cycles() {
    use std::sync::atomic::{AtomicBool, Ordering};

    let mut harness = TestHarness::new(reference_feed(), campus_metadata());
    let all_up = FeedBuilder::new()
        .device("A", "closet a", "d1", "up")
        .device("B", "closet b", "d3", "up")
        .device("C", "closet c", "d4", "up")
        .build()
        .unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let reader = {
        let snapshots = harness.snapshots.clone();
        let done = done.clone();
        tokio::spawn(async move {
            let mut reads = 0usize;
            loop {
                let stop = done.load(Ordering::Acquire);
                let snap = snapshots.get_snapshot();
                assert!(snap.is_consistent());
                if snap.version > 0 {
                    assert_eq!(snap.counters.total(), snap.locations.len());
                    assert_eq!(snap.sites.len(), 4);
                }
                reads += 1;
                if stop {
                    break reads;
                }
                tokio::task::yield_now().await;
            }
        })
    };

    for round in 0..20 {
        let feed = if round % 2 == 0 { reference_feed() } else { all_up.clone() };
        harness.source.set_feed(feed);
        harness.cycle().await.unwrap();
    }
    done.store(true, Ordering::Release);

    assert!(reader.await.unwrap() > 0);
    assert_eq!(harness.snapshot().version, 20);
    harness.assert_counters(3, 0, 0).unwrap();
}
