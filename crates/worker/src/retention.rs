//! Partition retention sweep.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::interval;
use tracing::{error, info};

use engine_core::Result;
use fact_store::{FactStore, PartitionId};
use telemetry::metrics;

/// Drops partitions whose entire range is older than the retention window.
///
/// Aggregates already computed from those facts are deliberately left in
/// place: the engine tolerates partition drops without corrupting them, and
/// a recompute over a dropped range simply sees fewer facts.
pub struct RetentionWorker {
    store: Arc<dyn FactStore>,
    retention_days: u32,
}

impl RetentionWorker {
    pub fn new(store: Arc<dyn FactStore>, retention_days: u32) -> Self {
        Self {
            store,
            retention_days,
        }
    }

    /// One sweep. Returns the dropped partition ids.
    pub async fn run_once(&self) -> Result<Vec<PartitionId>> {
        let cutoff = Utc::now().date_naive() - chrono::Duration::days(i64::from(self.retention_days));
        let dropped = self.store.drop_partitions_before(cutoff).await?;
        if !dropped.is_empty() {
            metrics().partitions_dropped.inc_by(dropped.len() as u64);
            info!(cutoff = %cutoff, count = dropped.len(), "dropped aged partitions");
        }
        Ok(dropped)
    }

    /// Sweeps on the given period until the task is aborted.
    pub async fn run(&self, period: Duration) {
        let mut ticker = interval(period);
        loop {
            ticker.tick().await;
            if let Err(e) = self.run_once().await {
                error!("retention sweep error: {}", e);
            }
        }
    }
}
