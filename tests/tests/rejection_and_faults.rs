//! Record-level rejection isolation and retryable partition faults.

use serde_json::json;

use integration_tests::fixtures::{record, Rig};

/// A batch of 100 records where 3 fail normalization yields 97 committed
/// events and 3 reported rejections, never a fully-failed batch.
#[tokio::test]
async fn bad_records_are_rejected_individually() {
    let mut batch: Vec<_> = (0..97)
        .map(|i| {
            record(
                &format!("u{}", i % 10),
                &format!("s{}", i % 10),
                &format!("2025-03-10T0{}:{:02}:00Z", i % 9, i % 60),
                (i % 20 + 1) as u32,
                "read",
            )
        })
        .collect();
    // Three malformed records: missing user, bad timestamp, unknown action.
    batch.insert(
        10,
        json!({
            "session_id": "s1",
            "timestamp": "2025-03-10T10:00:00Z",
            "page_url": "https://news.example.com/tech/article-1",
            "action": "read"
        }),
    );
    batch.insert(
        40,
        record("u1", "s1", "not-a-timestamp", 1, "read"),
    );
    batch.insert(
        80,
        record("u1", "s1", "2025-03-10T11:00:00Z", 1, "teleport"),
    );

    let rig = Rig::new();
    let result = rig.load(&batch).await;

    assert_eq!(result.accepted, 97);
    assert_eq!(result.rejected.len(), 3);
    assert!(result.is_fully_committed());

    let reasons: Vec<&str> = result.rejected.iter().map(|r| r.reason.as_str()).collect();
    assert!(reasons.iter().any(|r| r.contains("user_id")));
    assert!(reasons.iter().any(|r| r.contains("timestamp")));
    assert!(reasons.iter().any(|r| r.contains("teleport")));

    let (store, engine) = rig.drain().await;
    assert_eq!(store.row_count(), 97);
    assert_eq!(engine.user_count(), 10);
}

/// Rejection indexes point at the offending records in the submitted batch.
#[tokio::test]
async fn rejections_carry_batch_positions() {
    let batch = vec![
        record("u1", "s1", "2025-03-10T10:00:00Z", 1, "read"),
        record("u1", "s1", "bad", 1, "read"),
        record("u1", "s1", "2025-03-10T10:02:00Z", 1, "read"),
    ];

    let rig = Rig::new();
    let result = rig.load(&batch).await;
    assert_eq!(result.accepted, 2);
    assert_eq!(result.rejected.len(), 1);
    assert_eq!(result.rejected[0].index, 1);
}

/// A partition fault aborts the slice, reports it as retryable, and leaves
/// no partial state; resubmitting after the fault clears commits everything
/// exactly once, aggregates included.
#[tokio::test]
async fn failed_slices_resubmit_without_double_counting() {
    let batch: Vec<_> = (0..6)
        .map(|i| {
            record(
                "u1",
                "s1",
                &format!("2025-03-12T10:00:{i:02}Z"),
                9,
                "read",
            )
        })
        .collect();

    let rig = Rig::new();
    rig.store.set_partition_fault(Some("storage offline"));

    let failed = rig.load(&batch).await;
    assert_eq!(failed.accepted, 0);
    assert_eq!(failed.failed_slices.len(), 1);
    assert!(failed.failed_slices[0].error.is_retryable());
    assert_eq!(failed.failed_slices[0].events.len(), 6);
    assert_eq!(rig.store.row_count(), 0);

    // Fault clears; the caller resubmits the same batch.
    rig.store.set_partition_fault(None);
    let retried = rig.load(&batch).await;
    assert_eq!(retried.accepted, 6);
    assert_eq!(retried.duplicates, 0);
    assert!(retried.is_fully_committed());

    let (store, engine) = rig.drain().await;
    assert_eq!(store.row_count(), 6);

    // The failed attempt never reached the aggregates.
    let content = engine.content_profile("9").unwrap();
    assert_eq!(content.total_views, 6);
    assert_eq!(engine.user_profile("u1").unwrap().total_interactions, 6);
}

/// An insert fault after partition creation also aborts atomically.
#[tokio::test]
async fn insert_faults_leave_the_partition_unchanged() {
    let batch = vec![record("u1", "s1", "2025-03-13T10:00:00Z", 1, "read")];

    let rig = Rig::new();
    rig.store.set_insert_fault(Some("write timeout"));
    let failed = rig.load(&batch).await;
    assert_eq!(failed.accepted, 0);
    assert_eq!(failed.failed_slices.len(), 1);
    assert_eq!(rig.store.row_count(), 0);

    rig.store.set_insert_fault(None);
    let retried = rig.load(&batch).await;
    assert_eq!(retried.accepted, 1);

    let (store, engine) = rig.drain().await;
    assert_eq!(store.row_count(), 1);
    assert_eq!(engine.user_profile("u1").unwrap().total_interactions, 1);
}
