//! Delta consumer applying committed batches to the aggregation engine.
//!
//! This worker is the async half of the load path:
//! 1. Receive a committed delta (newly-inserted rows only)
//! 2. Fold it into the aggregation engine
//! 3. Repeat until every delta sender is gone
//!
//! Aggregation never fails a load: conflicts are counted and logged, and
//! the worker keeps draining. Falling behind shows up as queue depth (a
//! liveness warning), never as lost or double-applied deltas.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use aggregates::AggregationEngine;
use engine_core::InteractionEvent;
use telemetry::metrics;

/// Consumes the post-commit delta queue.
pub struct AggregationWorker {
    engine: Arc<AggregationEngine>,
    /// Queue depth at which a lag warning is emitted.
    lag_warn_depth: usize,
}

impl AggregationWorker {
    pub fn new(engine: Arc<AggregationEngine>, lag_warn_depth: usize) -> Self {
        Self {
            engine,
            lag_warn_depth,
        }
    }

    /// Drains the queue until the last sender is dropped, then returns.
    /// Every delta received was durably committed first, so each committed
    /// fact is reflected exactly once.
    pub async fn run(&self, mut rx: mpsc::Receiver<Vec<InteractionEvent>>) {
        info!(lag_warn_depth = self.lag_warn_depth, "aggregation worker starting");

        while let Some(delta) = rx.recv().await {
            let depth = rx.len();
            metrics().delta_queue_depth.set(depth as u64);
            if depth >= self.lag_warn_depth {
                warn!(depth, "aggregation lagging behind ingestion");
            }

            let started = Instant::now();
            let report = self.engine.apply_delta(&delta);

            metrics().deltas_applied.inc();
            metrics().events_aggregated.inc_by(report.applied as u64);
            if report.conflicts > 0 {
                metrics()
                    .aggregation_conflicts
                    .inc_by(report.conflicts as u64);
            }
            metrics()
                .apply_latency_ms
                .observe(started.elapsed().as_millis() as u64);

            debug!(
                events = report.applied,
                conflicts = report.conflicts,
                "delta applied"
            );
        }

        metrics().delta_queue_depth.set(0);
        info!("delta queue closed; aggregation worker stopping");
    }
}
