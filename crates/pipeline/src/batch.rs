//! Event batch accumulation, grouped by target partition.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use engine_core::InteractionEvent;
use fact_store::PartitionId;

/// A slice of normalized events destined for one partition.
#[derive(Debug)]
pub struct PartitionBatch {
    pub partition: PartitionId,
    pub events: Vec<InteractionEvent>,
    pub created_at: Instant,
}

impl PartitionBatch {
    pub fn new(partition: PartitionId) -> Self {
        Self {
            partition,
            events: Vec::new(),
            created_at: Instant::now(),
        }
    }

    pub fn push(&mut self, event: InteractionEvent) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Take events and reset the batch.
    pub fn take(&mut self) -> Vec<InteractionEvent> {
        self.created_at = Instant::now();
        std::mem::take(&mut self.events)
    }
}

/// Batch accumulator configuration.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Maximum batch size before flush
    pub max_size: usize,
    /// Maximum batch age before flush
    pub max_age: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_size: 100,
            max_age: Duration::from_millis(500),
        }
    }
}

/// Accumulates normalized events into per-partition batches for the
/// micro-batch path. The one-shot binary chunks by batch size instead.
pub struct BatchAccumulator {
    config: BatchConfig,
    batches: Mutex<HashMap<PartitionId, PartitionBatch>>,
}

impl BatchAccumulator {
    pub fn new(config: BatchConfig) -> Self {
        Self {
            config,
            batches: Mutex::new(HashMap::new()),
        }
    }

    /// Add an event to the batch for its partition.
    /// Returns the batch if it reached the flush size.
    pub fn add(&self, event: InteractionEvent) -> Option<PartitionBatch> {
        let partition = PartitionId::for_date(event.event_date);
        let mut batches = self.batches.lock();

        let batch = batches
            .entry(partition)
            .or_insert_with(|| PartitionBatch::new(partition));

        batch.push(event);

        if batch.len() >= self.config.max_size {
            let events = batch.take();
            return Some(PartitionBatch {
                partition,
                events,
                created_at: Instant::now(),
            });
        }

        None
    }

    /// Flush all batches that have exceeded max age.
    pub fn flush_aged(&self) -> Vec<PartitionBatch> {
        let mut batches = self.batches.lock();
        let mut flushed = Vec::new();

        for batch in batches.values_mut() {
            if batch.age() >= self.config.max_age && !batch.is_empty() {
                let events = batch.take();
                flushed.push(PartitionBatch {
                    partition: batch.partition,
                    events,
                    created_at: Instant::now(),
                });
            }
        }

        flushed
    }

    /// Flush all batches regardless of size or age.
    pub fn flush_all(&self) -> Vec<PartitionBatch> {
        let mut batches = self.batches.lock();
        let mut flushed = Vec::new();

        for batch in batches.values_mut() {
            if !batch.is_empty() {
                let events = batch.take();
                flushed.push(PartitionBatch {
                    partition: batch.partition,
                    events,
                    created_at: Instant::now(),
                });
            }
        }

        flushed
    }
}
