//! Partition creation under concurrency and boundary behavior.

use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::mpsc;

use aggregates::{AggregationConfig, AggregationEngine};
use engine_core::Normalizer;
use fact_store::{DateRange, FactStore, MemoryStore, PartitionId};
use integration_tests::fixtures::{record, Rig};
use pipeline::Loader;
use worker::AggregationWorker;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// N concurrent first-writers to the same new month produce exactly one
/// partition, and every write succeeds. Each task gets its own loader (and
/// so its own partition-manager cache) against the shared store, so the
/// create-if-absent race happens at the store for real.
#[tokio::test]
async fn concurrent_first_writers_share_one_partition() {
    const WRITERS: usize = 8;

    let store = Arc::new(MemoryStore::new());
    let engine = Arc::new(AggregationEngine::new(AggregationConfig::default()));
    let (tx, rx) = mpsc::channel(WRITERS * 2);

    let mut tasks = Vec::new();
    for w in 0..WRITERS {
        let loader = Loader::new(store.clone(), Normalizer::default(), tx.clone());
        tasks.push(tokio::spawn(async move {
            let batch: Vec<_> = (0..5)
                .map(|i| {
                    record(
                        &format!("u{w}"),
                        &format!("s{w}"),
                        &format!("2025-06-10T08:{w:02}:{i:02}Z"),
                        1,
                        "view",
                    )
                })
                .collect();
            loader.load(&batch).await
        }));
    }
    drop(tx);

    let mut accepted = 0;
    for task in tasks {
        let result = task.await.unwrap();
        assert!(result.is_fully_committed());
        accepted += result.accepted;
    }
    assert_eq!(accepted, WRITERS * 5);

    AggregationWorker::new(engine.clone(), usize::MAX).run(rx).await;

    let partitions = store.partitions().await.unwrap();
    assert_eq!(partitions, vec![PartitionId::new(2025, 6).unwrap()]);
    assert_eq!(store.row_count(), WRITERS * 5);
    assert_eq!(engine.user_count(), WRITERS);
}

/// Month-boundary events land in distinct, non-overlapping partitions, and
/// a query for the March day never returns the April row.
#[tokio::test]
async fn month_boundary_events_split_cleanly() {
    let rig = Rig::new();
    let result = rig
        .load(&[
            record("u1", "s1", "2025-03-31T23:59:00Z", 1, "read"),
            record("u1", "s1", "2025-04-01T00:01:00Z", 1, "read"),
        ])
        .await;
    assert_eq!(result.accepted, 2);

    let (store, _engine) = rig.drain().await;

    let partitions = store.partitions().await.unwrap();
    assert_eq!(
        partitions,
        vec![
            PartitionId::new(2025, 3).unwrap(),
            PartitionId::new(2025, 4).unwrap(),
        ]
    );

    let march_rows = store
        .events_in_range(DateRange::single(date(2025, 3, 31)))
        .await
        .unwrap();
    assert_eq!(march_rows.len(), 1);
    assert_eq!(march_rows[0].event_date, date(2025, 3, 31));

    let april_rows = store
        .events_in_range(DateRange::single(date(2025, 4, 1)))
        .await
        .unwrap();
    assert_eq!(april_rows.len(), 1);
    assert_eq!(april_rows[0].event_date, date(2025, 4, 1));
}

/// A spread of dates inside one month reuses a single partition.
#[tokio::test]
async fn one_partition_per_month_not_per_day() {
    let rig = Rig::new();
    let batch: Vec<_> = (1..=9)
        .map(|d| {
            record(
                "u1",
                "s1",
                &format!("2025-03-0{d}T12:00:00Z"),
                d as u32,
                "read",
            )
        })
        .collect();
    rig.load(&batch).await;

    let (store, _engine) = rig.drain().await;
    assert_eq!(store.partitions().await.unwrap().len(), 1);
    assert_eq!(store.row_count(), 9);
}
