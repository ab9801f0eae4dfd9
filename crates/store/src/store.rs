//! The persistent-store contract the engine writes through.

use async_trait::async_trait;
use chrono::NaiveDate;

use engine_core::{Action, InteractionEvent, Result};

use crate::partition::{PartitionId, PartitionSpec};

/// Outcome of an idempotent batch insert into one partition.
#[derive(Debug, Default)]
pub struct InsertOutcome {
    /// Rows that were actually inserted: the slice's delta.
    pub inserted: Vec<InteractionEvent>,
    /// Rows ignored because their fact key already existed.
    pub duplicates: usize,
}

/// Inclusive date range for fact queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn single(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// Operations the engine issues against the fact store.
///
/// Implementations must make `create_partition_if_absent` safe under
/// concurrent callers and `insert_batch` atomic within one partition.
/// These are the access patterns the partition/index design serves:
/// date range, user, article, and action.
#[async_trait]
pub trait FactStore: Send + Sync {
    /// Provisions a partition and its secondary indexes. Returns `true`
    /// when this call created it, `false` when it already existed; a
    /// losing race observes success, never an error. Overlapping an
    /// existing partition's range is a fault.
    async fn create_partition_if_absent(&self, spec: &PartitionSpec) -> Result<bool>;

    /// Partitions currently provisioned, in range order.
    async fn partitions(&self) -> Result<Vec<PartitionId>>;

    /// Inserts a slice of events into one partition, ignoring rows whose
    /// (interaction_id, event_date) key already exists. All-or-nothing: a
    /// fault leaves the partition unchanged.
    async fn insert_batch(
        &self,
        partition: PartitionId,
        events: Vec<InteractionEvent>,
    ) -> Result<InsertOutcome>;

    /// Facts with `event_date` inside the range, ordered by fact key.
    async fn events_in_range(&self, range: DateRange) -> Result<Vec<InteractionEvent>>;

    /// Facts for one user, across all partitions.
    async fn events_for_user(&self, user_id: &str) -> Result<Vec<InteractionEvent>>;

    /// Facts for one article, across all partitions.
    async fn events_for_article(&self, article_id: &str) -> Result<Vec<InteractionEvent>>;

    /// Facts in the range carrying the given action.
    async fn events_by_action(
        &self,
        range: DateRange,
        action: Action,
    ) -> Result<Vec<InteractionEvent>>;

    /// Drops partitions whose entire range ends on or before `cutoff`.
    /// Returns the dropped ids. Aggregates computed from dropped facts are
    /// not touched.
    async fn drop_partitions_before(&self, cutoff: NaiveDate) -> Result<Vec<PartitionId>>;
}
