//! Batch loading: normalize, partition, idempotent write, delta hand-off.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use engine_core::{Error, InteractionEvent, Normalizer, Result};
use fact_store::{FactStore, InsertOutcome, PartitionId, PartitionManager};
use telemetry::metrics;

/// A record rejected during normalization. The batch continues without it.
#[derive(Debug, Clone)]
pub struct Rejection {
    /// Position in the submitted batch.
    pub index: usize,
    pub reason: String,
}

/// A partition slice that could not be committed. Resubmitting the same
/// records is safe: writes are idempotent on (interaction_id, event_date).
#[derive(Debug)]
pub struct FailedSlice {
    pub partition: PartitionId,
    pub events: Vec<InteractionEvent>,
    pub error: Error,
}

/// Outcome of one `load` call.
#[derive(Debug)]
pub struct LoadResult {
    pub load_id: Uuid,
    /// Rows newly committed to the fact store.
    pub accepted: usize,
    /// Rows ignored because they were already committed.
    pub duplicates: usize,
    pub rejected: Vec<Rejection>,
    /// Retryable partition slices; empty on a fully-committed load.
    pub failed_slices: Vec<FailedSlice>,
}

impl LoadResult {
    /// True when every slice of the batch reached the store.
    pub fn is_fully_committed(&self) -> bool {
        self.failed_slices.is_empty()
    }
}

/// Writes event batches through the partition manager and hands committed
/// deltas to the aggregation side.
///
/// The delta contains only newly-inserted rows, and it is sent only after
/// the slice is durably committed, so re-submitting an already-loaded batch
/// is a no-op all the way through the aggregates. Multiple
/// loaders may run concurrently; partition creation tolerates the race and
/// the store scopes write exclusion to the partition.
pub struct Loader {
    store: Arc<dyn FactStore>,
    partitions: PartitionManager,
    normalizer: Normalizer,
    delta_tx: mpsc::Sender<Vec<InteractionEvent>>,
}

impl Loader {
    pub fn new(
        store: Arc<dyn FactStore>,
        normalizer: Normalizer,
        delta_tx: mpsc::Sender<Vec<InteractionEvent>>,
    ) -> Self {
        Self {
            partitions: PartitionManager::new(store.clone()),
            store,
            normalizer,
            delta_tx,
        }
    }

    /// Loads one batch of decoded records.
    ///
    /// Records failing normalization are rejected individually; the batch
    /// continues. Each partition's slice is applied atomically.
    pub async fn load(&self, records: &[serde_json::Value]) -> LoadResult {
        let mut rejected = Vec::new();
        let mut events = Vec::with_capacity(records.len());
        for (index, record) in records.iter().enumerate() {
            match self.normalizer.normalize(record) {
                Ok(event) => events.push(event),
                Err(e) => {
                    metrics().records_rejected.inc();
                    rejected.push(Rejection {
                        index,
                        reason: e.to_string(),
                    });
                }
            }
        }
        metrics().events_normalized.inc_by(events.len() as u64);

        self.load_events(events, rejected).await
    }

    /// Loads already-normalized events (the micro-batch path).
    pub async fn load_events(
        &self,
        events: Vec<InteractionEvent>,
        rejected: Vec<Rejection>,
    ) -> LoadResult {
        let load_id = Uuid::new_v4();
        let started = Instant::now();

        let mut slices: BTreeMap<PartitionId, Vec<InteractionEvent>> = BTreeMap::new();
        for event in events {
            slices
                .entry(PartitionId::for_date(event.event_date))
                .or_default()
                .push(event);
        }

        let mut result = LoadResult {
            load_id,
            accepted: 0,
            duplicates: 0,
            rejected,
            failed_slices: Vec::new(),
        };
        let mut delta: Vec<InteractionEvent> = Vec::new();

        for (partition, slice) in slices {
            match self.commit_slice(partition, slice.clone()).await {
                Ok(outcome) => {
                    result.accepted += outcome.inserted.len();
                    result.duplicates += outcome.duplicates;
                    delta.extend(outcome.inserted);
                }
                Err(error) => {
                    warn!(
                        load_id = %load_id,
                        partition = %partition,
                        events = slice.len(),
                        error = %error,
                        "partition slice aborted; safe to resubmit"
                    );
                    // Drop the cached id so a retry re-ensures the
                    // partition, e.g. after a retention sweep removed it.
                    self.partitions.forget(&[partition]);
                    metrics().partition_faults.inc();
                    result.failed_slices.push(FailedSlice {
                        partition,
                        events: slice,
                        error,
                    });
                }
            }
        }

        metrics().batches_loaded.inc();
        metrics().rows_inserted.inc_by(result.accepted as u64);
        metrics().duplicate_rows.inc_by(result.duplicates as u64);
        metrics()
            .load_latency_ms
            .observe(started.elapsed().as_millis() as u64);

        // Hand off only after commit, and only the newly-inserted rows.
        // A full queue backpressures here, bounding aggregation lag.
        if !delta.is_empty() {
            metrics().deltas_enqueued.inc();
            if self.delta_tx.send(delta).await.is_err() {
                warn!(load_id = %load_id, "delta receiver closed; aggregates will need a recompute");
            }
        }

        debug!(
            load_id = %load_id,
            accepted = result.accepted,
            duplicates = result.duplicates,
            rejected = result.rejected.len(),
            failed_slices = result.failed_slices.len(),
            "batch load finished"
        );
        result
    }

    /// Ensures the slice's partition and writes it as one atomic unit.
    async fn commit_slice(
        &self,
        partition: PartitionId,
        slice: Vec<InteractionEvent>,
    ) -> Result<InsertOutcome> {
        let first_date = match slice.first() {
            Some(event) => event.event_date,
            None => return Ok(InsertOutcome::default()),
        };
        // A partition fault aborts this slice before any write happens; the
        // events are reported back rather than silently dropped.
        self.partitions.ensure_partition(first_date).await?;
        self.store.insert_batch(partition, slice).await
    }
}
