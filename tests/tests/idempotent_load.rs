//! Idempotence of the load path, end to end: fact store and aggregates.

use integration_tests::fixtures::{exact_duplicate_pair, record, Rig};

/// Loading the same batch twice yields the same fact-store content and the
/// same aggregate state as loading it once.
#[tokio::test]
async fn reloading_a_batch_changes_nothing() {
    let batch: Vec<_> = (0..10)
        .map(|i| {
            record(
                &format!("u{}", i % 3),
                &format!("s{}", i % 3),
                &format!("2025-03-0{}T10:00:{:02}Z", i % 5 + 1, i),
                (i + 1) as u32,
                "read",
            )
        })
        .collect();

    let once = Rig::new();
    let first = once.load(&batch).await;
    assert_eq!(first.accepted, 10);
    assert_eq!(first.duplicates, 0);
    assert!(first.is_fully_committed());
    let (once_store, once_engine) = once.drain().await;

    let twice = Rig::new();
    twice.load(&batch).await;
    let second = twice.load(&batch).await;
    assert_eq!(second.accepted, 0);
    assert_eq!(second.duplicates, 10);
    let (twice_store, twice_engine) = twice.drain().await;

    assert_eq!(once_store.row_count(), twice_store.row_count());
    assert_eq!(once_engine.snapshot(), twice_engine.snapshot());
}

/// The concrete dedup scenario: an exact duplicate pair loads once and the
/// content profile counts a single view.
#[tokio::test]
async fn exact_duplicate_pair_counts_once() {
    let rig = Rig::new();
    let result = rig.load(&exact_duplicate_pair()).await;

    assert_eq!(result.accepted, 1);
    assert_eq!(result.duplicates, 1);
    assert!(result.rejected.is_empty());

    let (store, engine) = rig.drain().await;
    assert_eq!(store.row_count(), 1);

    let content = engine.content_profile("42").expect("article profile");
    assert_eq!(content.total_views, 1);
    assert_eq!(content.distinct_visitors(), 1);
    assert_eq!(content.avg_time_spent(), Some(30.0));

    let user = engine.user_profile("u1").expect("user profile");
    assert_eq!(user.total_interactions, 1);
}

/// Duplicates arriving in a later, partially-new batch: only the new rows
/// drive aggregation.
#[tokio::test]
async fn overlapping_batches_aggregate_each_fact_once() {
    let first: Vec<_> = (0..4)
        .map(|i| {
            record(
                "u1",
                "s1",
                &format!("2025-03-05T10:00:{i:02}Z"),
                7,
                "read",
            )
        })
        .collect();
    // Second batch repeats two events and adds two new ones.
    let mut second = first[2..].to_vec();
    second.push(record("u1", "s1", "2025-03-05T10:01:00Z", 7, "share"));
    second.push(record("u2", "s2", "2025-03-05T10:02:00Z", 7, "read"));

    let rig = Rig::new();
    rig.load(&first).await;
    let result = rig.load(&second).await;
    assert_eq!(result.accepted, 2);
    assert_eq!(result.duplicates, 2);

    let (store, engine) = rig.drain().await;
    assert_eq!(store.row_count(), 6);

    let content = engine.content_profile("7").expect("article profile");
    assert_eq!(content.total_views, 6);
    assert_eq!(content.distinct_visitors(), 2);
}
