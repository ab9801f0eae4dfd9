//! Background workers for the analytics engine.
//!
//! Handles the async half of the pipeline:
//! - Aggregation (post-commit delta queue → aggregation engine)
//! - Session finalization (inactivity sweep)
//! - Retention (dropping fully-aged partitions)
//! - Metrics logging

pub mod aggregation;
pub mod retention;
pub mod scheduler;
pub mod sessions;

pub use aggregation::AggregationWorker;
pub use retention::RetentionWorker;
pub use scheduler::{WorkerConfig, WorkerHandles, WorkerScheduler};
pub use sessions::SessionFinalizerWorker;
