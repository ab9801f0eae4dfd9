//! Worker scheduler for background tasks.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::info;

use aggregates::AggregationEngine;
use engine_core::InteractionEvent;
use fact_store::FactStore;
use telemetry::metrics;

use crate::aggregation::AggregationWorker;
use crate::retention::RetentionWorker;
use crate::sessions::SessionFinalizerWorker;

/// Worker scheduler configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Session finalizer sweep interval
    pub session_sweep: Duration,
    /// Retention sweep interval
    pub retention_sweep: Duration,
    /// Retention window in days
    pub retention_days: u32,
    /// Delta queue depth that triggers a lag warning
    pub lag_warn_depth: usize,
    /// Metrics log interval
    pub metrics_log_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            session_sweep: Duration::from_secs(60),
            retention_sweep: Duration::from_secs(3600),
            retention_days: 90,
            lag_warn_depth: 48,
            metrics_log_interval: Duration::from_secs(60),
        }
    }
}

/// Handles for the spawned workers.
pub struct WorkerHandles {
    /// Ends on its own once the last delta sender is dropped.
    pub aggregation: JoinHandle<()>,
    /// Periodic sweeps; run until aborted.
    pub sweeps: Vec<JoinHandle<()>>,
}

impl WorkerHandles {
    /// Waits for the delta queue to drain, then stops the sweeps.
    pub async fn drain(self) {
        let _ = self.aggregation.await;
        for sweep in self.sweeps {
            sweep.abort();
        }
    }
}

/// Background worker scheduler.
pub struct WorkerScheduler {
    config: WorkerConfig,
    engine: Arc<AggregationEngine>,
    store: Arc<dyn FactStore>,
}

impl WorkerScheduler {
    pub fn new(
        config: WorkerConfig,
        engine: Arc<AggregationEngine>,
        store: Arc<dyn FactStore>,
    ) -> Self {
        Self {
            config,
            engine,
            store,
        }
    }

    /// Starts all background workers.
    pub fn start(&self, delta_rx: mpsc::Receiver<Vec<InteractionEvent>>) -> WorkerHandles {
        // Aggregation worker (delta queue → engine)
        let engine = self.engine.clone();
        let lag_warn_depth = self.config.lag_warn_depth;
        let aggregation = tokio::spawn(async move {
            AggregationWorker::new(engine, lag_warn_depth)
                .run(delta_rx)
                .await;
        });

        let mut sweeps = Vec::new();

        // Session finalizer
        let engine = self.engine.clone();
        let period = self.config.session_sweep;
        sweeps.push(tokio::spawn(async move {
            SessionFinalizerWorker::new(engine).run(period).await;
        }));

        // Retention sweep
        let store = self.store.clone();
        let retention_days = self.config.retention_days;
        let period = self.config.retention_sweep;
        sweeps.push(tokio::spawn(async move {
            RetentionWorker::new(store, retention_days).run(period).await;
        }));

        // Metrics logger
        let period = self.config.metrics_log_interval;
        sweeps.push(tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                ticker.tick().await;
                let snapshot = metrics().snapshot();
                info!(
                    rows_inserted = snapshot.rows_inserted,
                    duplicate_rows = snapshot.duplicate_rows,
                    records_rejected = snapshot.records_rejected,
                    deltas_applied = snapshot.deltas_applied,
                    queue_depth = snapshot.delta_queue_depth,
                    open_sessions = snapshot.open_sessions,
                    "engine metrics"
                );
            }
        }));

        info!("background workers started");
        WorkerHandles {
            aggregation,
            sweeps,
        }
    }
}
