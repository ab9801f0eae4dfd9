//! Order independence and recompute equivalence of the aggregation engine.

use chrono::NaiveDate;
use serde_json::Value;

use fact_store::DateRange;
use integration_tests::fixtures::{record, session_records, Rig};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// A workload touching two users, two sessions, three articles, and two
/// days, with some records sharing aggregate keys.
fn workload() -> Vec<Value> {
    let mut records = Vec::new();
    records.extend(session_records("u1", "s1", "2025-03-05", 4));
    records.extend(session_records("u2", "s2", "2025-03-05", 3));
    records.push(record("u1", "s3", "2025-03-06T09:00:00Z", 2, "share"));
    records.push(record("u1", "s3", "2025-03-06T09:05:00Z", 2, "comment"));
    records.push(record("u2", "s4", "2025-03-06T21:00:00Z", 3, "view"));
    records
}

/// Applying deltas D1 then D2 equals D2 then D1, for same-key-touching
/// deltas, observed through the full engine snapshot.
#[tokio::test]
async fn delta_application_order_is_irrelevant() {
    let all = workload();
    let (d1, d2) = all.split_at(all.len() / 2);

    let forward = Rig::new();
    forward.load(d1).await;
    forward.load(d2).await;
    let (_, forward_engine) = forward.drain().await;

    let backward = Rig::new();
    backward.load(d2).await;
    backward.load(d1).await;
    let (_, backward_engine) = backward.drain().await;

    assert_eq!(forward_engine.snapshot(), backward_engine.snapshot());
}

/// Batch boundaries are invisible: one big batch and many tiny ones
/// converge to identical aggregate state.
#[tokio::test]
async fn batch_boundaries_do_not_change_aggregates() {
    let all = workload();

    let single = Rig::new();
    single.load(&all).await;
    let (_, single_engine) = single.drain().await;

    let chunked = Rig::new();
    for chunk in all.chunks(2) {
        chunked.load(chunk).await;
    }
    let (_, chunked_engine) = chunked.drain().await;

    assert_eq!(single_engine.snapshot(), chunked_engine.snapshot());
}

/// recompute(range) over the fact store equals the state reached by
/// sequential apply_delta calls over every event in that range.
#[tokio::test]
async fn recompute_matches_incremental_application() {
    let all = workload();

    let incremental = Rig::new();
    for chunk in all.chunks(3) {
        incremental.load(chunk).await;
    }
    let (store, incremental_engine) = incremental.drain().await;

    // Fresh engine, same committed facts, rebuilt from the store.
    let rebuilt = aggregates::AggregationEngine::default();
    let range = DateRange::new(date(2025, 3, 1), date(2025, 3, 31));
    let report = rebuilt.recompute(range, store.as_ref()).await.unwrap();

    assert_eq!(report.events, all.len());
    assert_eq!(report.conflicts, 0);
    assert_eq!(incremental_engine.snapshot(), rebuilt.snapshot());
}

/// Recompute is also idempotent on an engine that already holds the
/// incremental state: rebuilding the range in place changes nothing.
#[tokio::test]
async fn recompute_over_applied_state_is_a_fixed_point() {
    let all = workload();

    let rig = Rig::new();
    rig.load(&all).await;
    let (store, engine) = rig.drain().await;

    let before = engine.snapshot();
    let range = DateRange::new(date(2025, 3, 1), date(2025, 3, 31));
    engine.recompute(range, store.as_ref()).await.unwrap();

    assert_eq!(before, engine.snapshot());
}

/// Spot-check the derived values the reporting side reads.
#[tokio::test]
async fn derived_aggregates_reflect_the_workload() {
    let rig = Rig::new();
    rig.load(&workload()).await;
    let (_, engine) = rig.drain().await;

    let day_one = engine.daily_aggregate(date(2025, 3, 5)).unwrap();
    assert_eq!(day_one.total_interactions, 7);
    assert_eq!(day_one.active_users(), 2);
    assert_eq!(day_one.actions.get("read"), Some(&7));

    let day_two = engine.daily_aggregate(date(2025, 3, 6)).unwrap();
    assert_eq!(day_two.total_interactions, 3);
    assert_eq!(day_two.sessions.len(), 2);

    let u1 = engine.user_profile("u1").unwrap();
    assert_eq!(u1.total_interactions, 6);
    assert_eq!(u1.session_count(), 2);
    assert_eq!(u1.preferred_device(), Some("mobile"));
    assert_eq!(u1.preferred_content_category(), Some("technology"));

    let s1 = engine.session_profile("s1").unwrap();
    assert_eq!(s1.page_count, 4);
    assert!(!s1.closed);
    assert_eq!(s1.dominant_referrer(), Some("search"));

    let article2 = engine.article_performance("2", date(2025, 3, 6)).unwrap();
    assert_eq!(article2.views, 2);
    assert_eq!(article2.visitors.len(), 1);
}
