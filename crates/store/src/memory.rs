//! In-memory reference backend for the fact store.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::{Mutex, RwLock};

use engine_core::{Action, Error, FactKey, InteractionEvent, Result};

use crate::partition::{PartitionId, PartitionSpec};
use crate::store::{DateRange, FactStore, InsertOutcome};

#[derive(Default)]
struct ShardData {
    rows: BTreeMap<FactKey, InteractionEvent>,
    by_user: HashMap<String, Vec<FactKey>>,
    by_article: HashMap<String, Vec<FactKey>>,
}

struct Shard {
    spec: PartitionSpec,
    data: Mutex<ShardData>,
}

/// Reference [`FactStore`] backed by process memory.
///
/// Writes lock only the target partition's shard, so unrelated partitions
/// never contend. A durable backend would implement the same trait; the
/// tests and the one-shot binary run against this one.
pub struct MemoryStore {
    partitions: RwLock<BTreeMap<PartitionId, Arc<Shard>>>,
    /// When set, partition creation fails with this message (tests).
    partition_fault: Mutex<Option<String>>,
    /// When set, inserts fail with this message (tests).
    insert_fault: Mutex<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            partitions: RwLock::new(BTreeMap::new()),
            partition_fault: Mutex::new(None),
            insert_fault: Mutex::new(None),
        }
    }

    /// Simulate a storage fault on partition creation.
    pub fn set_partition_fault(&self, message: Option<&str>) {
        *self.partition_fault.lock() = message.map(str::to_string);
    }

    /// Simulate a storage fault on insert.
    pub fn set_insert_fault(&self, message: Option<&str>) {
        *self.insert_fault.lock() = message.map(str::to_string);
    }

    /// Total committed rows across all partitions.
    pub fn row_count(&self) -> usize {
        self.partitions
            .read()
            .values()
            .map(|shard| shard.data.lock().rows.len())
            .sum()
    }

    fn shard(&self, partition: PartitionId) -> Result<Arc<Shard>> {
        self.partitions
            .read()
            .get(&partition)
            .cloned()
            .ok_or_else(|| Error::partition_fault(partition.to_string(), "partition not provisioned"))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FactStore for MemoryStore {
    async fn create_partition_if_absent(&self, spec: &PartitionSpec) -> Result<bool> {
        if let Some(message) = self.partition_fault.lock().clone() {
            return Err(Error::partition_fault(spec.id.to_string(), message));
        }

        let mut partitions = self.partitions.write();
        if let Some(existing) = partitions.get(&spec.id) {
            if existing.spec != *spec {
                return Err(Error::partition_fault(
                    spec.id.to_string(),
                    "spec differs from the existing partition",
                ));
            }
            return Ok(false);
        }

        // Never allow a range overlapping an already-provisioned partition.
        for shard in partitions.values() {
            if spec.start < shard.spec.end && shard.spec.start < spec.end {
                return Err(Error::partition_fault(
                    spec.id.to_string(),
                    format!("range overlaps partition {}", shard.spec.id),
                ));
            }
        }

        partitions.insert(
            spec.id,
            Arc::new(Shard {
                spec: spec.clone(),
                data: Mutex::new(ShardData::default()),
            }),
        );
        Ok(true)
    }

    async fn partitions(&self) -> Result<Vec<PartitionId>> {
        Ok(self.partitions.read().keys().copied().collect())
    }

    async fn insert_batch(
        &self,
        partition: PartitionId,
        events: Vec<InteractionEvent>,
    ) -> Result<InsertOutcome> {
        if let Some(message) = self.insert_fault.lock().clone() {
            return Err(Error::store(message));
        }

        let shard = self.shard(partition)?;

        // Validate the whole slice before touching the shard, so a bad row
        // cannot leave partial state behind.
        for event in &events {
            if event.event_date < shard.spec.start || event.event_date >= shard.spec.end {
                return Err(Error::partition_fault(
                    partition.to_string(),
                    format!(
                        "event {} dated {} is outside the partition range",
                        event.interaction_id, event.event_date
                    ),
                ));
            }
        }

        let mut data = shard.data.lock();
        let mut outcome = InsertOutcome::default();
        for event in events {
            let key = event.fact_key();
            if data.rows.contains_key(&key) {
                outcome.duplicates += 1;
                continue;
            }
            data.by_user
                .entry(event.user_id.clone())
                .or_default()
                .push(key.clone());
            if let Some(article) = &event.article_id {
                data.by_article
                    .entry(article.clone())
                    .or_default()
                    .push(key.clone());
            }
            data.rows.insert(key, event.clone());
            outcome.inserted.push(event);
        }
        Ok(outcome)
    }

    async fn events_in_range(&self, range: DateRange) -> Result<Vec<InteractionEvent>> {
        let shards: Vec<Arc<Shard>> = self.partitions.read().values().cloned().collect();
        let mut events = Vec::new();
        for shard in shards {
            if shard.spec.end <= range.start || shard.spec.start > range.end {
                continue;
            }
            let data = shard.data.lock();
            events.extend(
                data.rows
                    .values()
                    .filter(|e| range.contains(e.event_date))
                    .cloned(),
            );
        }
        Ok(events)
    }

    async fn events_for_user(&self, user_id: &str) -> Result<Vec<InteractionEvent>> {
        let shards: Vec<Arc<Shard>> = self.partitions.read().values().cloned().collect();
        let mut events = Vec::new();
        for shard in shards {
            let data = shard.data.lock();
            if let Some(keys) = data.by_user.get(user_id) {
                events.extend(keys.iter().filter_map(|k| data.rows.get(k)).cloned());
            }
        }
        events.sort_by(|a, b| a.fact_key().cmp(&b.fact_key()));
        Ok(events)
    }

    async fn events_for_article(&self, article_id: &str) -> Result<Vec<InteractionEvent>> {
        let shards: Vec<Arc<Shard>> = self.partitions.read().values().cloned().collect();
        let mut events = Vec::new();
        for shard in shards {
            let data = shard.data.lock();
            if let Some(keys) = data.by_article.get(article_id) {
                events.extend(keys.iter().filter_map(|k| data.rows.get(k)).cloned());
            }
        }
        events.sort_by(|a, b| a.fact_key().cmp(&b.fact_key()));
        Ok(events)
    }

    async fn events_by_action(
        &self,
        range: DateRange,
        action: Action,
    ) -> Result<Vec<InteractionEvent>> {
        let events = self.events_in_range(range).await?;
        Ok(events.into_iter().filter(|e| e.action == action).collect())
    }

    async fn drop_partitions_before(&self, cutoff: NaiveDate) -> Result<Vec<PartitionId>> {
        let mut partitions = self.partitions.write();
        let doomed: Vec<PartitionId> = partitions
            .iter()
            .filter(|(_, shard)| shard.spec.end <= cutoff)
            .map(|(id, _)| *id)
            .collect();
        for id in &doomed {
            partitions.remove(id);
        }
        Ok(doomed)
    }
}
