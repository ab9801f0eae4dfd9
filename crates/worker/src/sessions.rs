//! Session finalization sweep.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tracing::debug;

use aggregates::AggregationEngine;
use telemetry::metrics;

/// Periodically closes sessions idle past the inactivity window.
///
/// Until a session is closed its end time and duration are provisional;
/// a late event reopens it, so sweeping early is never a correctness risk.
pub struct SessionFinalizerWorker {
    engine: Arc<AggregationEngine>,
}

impl SessionFinalizerWorker {
    pub fn new(engine: Arc<AggregationEngine>) -> Self {
        Self { engine }
    }

    /// One sweep: finalize whatever is idle, refresh the gauge.
    pub fn run_once(&self) -> usize {
        let closed = self.engine.finalize_idle_sessions();
        if closed > 0 {
            metrics().sessions_finalized.inc_by(closed as u64);
            debug!(closed, "finalized idle sessions");
        }
        metrics()
            .open_sessions
            .set(self.engine.open_session_count() as u64);
        closed
    }

    /// Sweeps on the given period until the task is aborted.
    pub async fn run(&self, period: Duration) {
        let mut ticker = interval(period);
        loop {
            ticker.tick().await;
            self.run_once();
        }
    }
}
