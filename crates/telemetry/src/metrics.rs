//! Internal metrics collection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A counter metric.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A gauge metric (can go up or down).
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn set(&self, val: u64) {
        self.0.store(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Latency accumulator: count + sum + max, all in milliseconds.
///
/// count and sum are kept separately so the mean is exact however many
/// observations arrive.
#[derive(Debug, Default)]
pub struct LatencyStat {
    count: AtomicU64,
    sum_ms: AtomicU64,
    max_ms: AtomicU64,
}

impl LatencyStat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&self, ms: u64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_ms.fetch_add(ms, Ordering::Relaxed);
        self.max_ms.fetch_max(ms, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn max_ms(&self) -> u64 {
        self.max_ms.load(Ordering::Relaxed)
    }

    pub fn mean_ms(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.sum_ms.load(Ordering::Relaxed) as f64 / count as f64
        }
    }
}

/// Collected metrics for the analytics engine.
#[derive(Debug, Default)]
pub struct Metrics {
    // Extraction / normalization
    pub records_decoded: Counter,
    pub records_rejected: Counter,
    pub events_normalized: Counter,

    // Load path
    pub batches_loaded: Counter,
    pub rows_inserted: Counter,
    pub duplicate_rows: Counter,
    pub partitions_created: Counter,
    pub partition_faults: Counter,

    // Aggregation path
    pub deltas_enqueued: Counter,
    pub deltas_applied: Counter,
    pub events_aggregated: Counter,
    pub aggregation_conflicts: Counter,
    pub sessions_finalized: Counter,
    pub partitions_dropped: Counter,

    // Latency
    pub load_latency_ms: LatencyStat,
    pub apply_latency_ms: LatencyStat,

    // Gauges
    pub delta_queue_depth: Gauge,
    pub open_sessions: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub records_decoded: u64,
    pub records_rejected: u64,
    pub events_normalized: u64,
    pub batches_loaded: u64,
    pub rows_inserted: u64,
    pub duplicate_rows: u64,
    pub partitions_created: u64,
    pub partition_faults: u64,
    pub deltas_enqueued: u64,
    pub deltas_applied: u64,
    pub events_aggregated: u64,
    pub aggregation_conflicts: u64,
    pub sessions_finalized: u64,
    pub partitions_dropped: u64,
    pub load_latency_mean_ms: f64,
    pub apply_latency_mean_ms: f64,
    pub delta_queue_depth: u64,
    pub open_sessions: u64,
}

impl Metrics {
    /// Takes a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            records_decoded: self.records_decoded.get(),
            records_rejected: self.records_rejected.get(),
            events_normalized: self.events_normalized.get(),
            batches_loaded: self.batches_loaded.get(),
            rows_inserted: self.rows_inserted.get(),
            duplicate_rows: self.duplicate_rows.get(),
            partitions_created: self.partitions_created.get(),
            partition_faults: self.partition_faults.get(),
            deltas_enqueued: self.deltas_enqueued.get(),
            deltas_applied: self.deltas_applied.get(),
            events_aggregated: self.events_aggregated.get(),
            aggregation_conflicts: self.aggregation_conflicts.get(),
            sessions_finalized: self.sessions_finalized.get(),
            partitions_dropped: self.partitions_dropped.get(),
            load_latency_mean_ms: self.load_latency_ms.mean_ms(),
            apply_latency_mean_ms: self.apply_latency_ms.mean_ms(),
            delta_queue_depth: self.delta_queue_depth.get(),
            open_sessions: self.open_sessions.get(),
        }
    }
}

/// Global metrics registry.
pub static METRICS: std::sync::LazyLock<Metrics> = std::sync::LazyLock::new(Metrics::new);

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}
