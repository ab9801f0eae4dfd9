//! Calendar-month partitioning of the fact store.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use engine_core::Result;
use telemetry::metrics;

use crate::store::FactStore;

/// Secondary indexes provisioned on every partition, mirroring the indexes
/// that exist on the logical whole.
pub const PARTITION_INDEXES: &[&str] = &["user_id", "article_id"];

/// Identifier of a calendar-month partition.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct PartitionId {
    year: i32,
    month: u32,
}

impl PartitionId {
    /// Partition covering the month of `date`.
    pub fn for_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Builds an id from explicit parts; `month` must be 1–12.
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// Inclusive first day of the covered range.
    pub fn range_start(&self) -> NaiveDate {
        // month is validated at construction, day 1 always exists
        NaiveDate::from_ymd_opt(self.year, self.month, 1).expect("valid month")
    }

    /// Exclusive upper bound: the first day of the following month.
    pub fn range_end(&self) -> NaiveDate {
        let (year, month) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };
        NaiveDate::from_ymd_opt(year, month, 1).expect("valid month")
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.range_start() && date < self.range_end()
    }

    /// Physical table name for this partition.
    pub fn table_name(&self) -> String {
        format!("user_interactions_{:04}_{:02}", self.year, self.month)
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}_{:02}", self.year, self.month)
    }
}

/// Everything the store needs to provision a partition: explicit
/// inclusive-start/exclusive-end boundaries plus the secondary indexes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSpec {
    pub id: PartitionId,
    /// Inclusive.
    pub start: NaiveDate,
    /// Exclusive.
    pub end: NaiveDate,
    pub indexes: Vec<String>,
}

impl PartitionSpec {
    /// The standard monthly spec for a partition id.
    pub fn monthly(id: PartitionId) -> Self {
        Self {
            id,
            start: id.range_start(),
            end: id.range_end(),
            indexes: PARTITION_INDEXES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Resolves event dates to partitions, creating them on first write.
///
/// Creation is expressed as create-if-absent against the store, so two
/// writers racing on the same new month both observe success. The local
/// cache only skips redundant store round-trips; correctness does not
/// depend on it.
pub struct PartitionManager {
    store: Arc<dyn FactStore>,
    known: RwLock<BTreeSet<PartitionId>>,
}

impl PartitionManager {
    pub fn new(store: Arc<dyn FactStore>) -> Self {
        Self {
            store,
            known: RwLock::new(BTreeSet::new()),
        }
    }

    /// Ensures the partition covering `event_date` exists and returns its id.
    ///
    /// Any failure other than "already exists" surfaces as a retryable
    /// fault; the caller must abort the write that needed the partition.
    pub async fn ensure_partition(&self, event_date: NaiveDate) -> Result<PartitionId> {
        let id = PartitionId::for_date(event_date);
        if self.known.read().contains(&id) {
            return Ok(id);
        }

        let spec = PartitionSpec::monthly(id);
        let created = self.store.create_partition_if_absent(&spec).await?;
        if created {
            metrics().partitions_created.inc();
            debug!(partition = %id, start = %spec.start, end = %spec.end, "created partition");
        }

        self.known.write().insert(id);
        Ok(id)
    }

    /// Drops ids from the local cache, e.g. after a retention sweep.
    pub fn forget(&self, ids: &[PartitionId]) {
        let mut known = self.known.write();
        for id in ids {
            known.remove(id);
        }
    }
}
