//! Unified error types for the analytics engine.
//!
//! Record-level failures (`NormalizationError`) reject a single record and
//! let the batch continue. Partition and store faults abort only the
//! affected partition slice and are retryable, because every write is
//! idempotent on its fact key.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure to turn one raw record into a canonical event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizationError {
    /// A required field is absent or null.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// The record does not deserialize into the expected shape.
    #[error("malformed record: {0}")]
    Malformed(String),

    /// The timestamp field could not be parsed.
    #[error("invalid timestamp {value:?}: {reason}")]
    InvalidTimestamp { value: String, reason: String },

    /// The action field is outside the known set.
    #[error("unknown action: {0}")]
    UnknownAction(String),
}

/// Unified error type for the analytics engine.
#[derive(Debug, Error)]
pub enum Error {
    /// A record failed normalization. Never aborts a batch.
    #[error(transparent)]
    Normalization(#[from] NormalizationError),

    /// A partition could not be created or located. Aborts the affected
    /// partition's slice of the batch; resubmission is safe.
    #[error("partition fault on {partition}: {message}")]
    PartitionFault { partition: String, message: String },

    /// The backing store failed outside partition handling.
    #[error("store fault: {0}")]
    Store(String),

    /// Aggregate state could not be merged commutatively, e.g. one session
    /// observed under two distinct users.
    #[error("aggregation conflict on {key}: {message}")]
    AggregationConflict { key: String, message: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a partition fault.
    pub fn partition_fault(partition: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::PartitionFault {
            partition: partition.into(),
            message: msg.into(),
        }
    }

    /// Create a store fault.
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create an aggregation conflict.
    pub fn aggregation_conflict(key: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::AggregationConflict {
            key: key.into(),
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether resubmitting the failed work is safe and expected to succeed.
    ///
    /// Writes are idempotent on (interaction_id, event_date), so partition
    /// and store faults can always be retried without double-counting.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PartitionFault { .. } | Self::Store(_))
    }
}
