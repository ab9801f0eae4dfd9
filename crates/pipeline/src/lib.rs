//! The ingestion pipeline.
//!
//! Exclusive owner of fact rows: normalizes decoded records, ensures
//! partitions, writes idempotently, and hands committed deltas to the
//! aggregation side.

pub mod batch;
pub mod loader;

pub use batch::{BatchAccumulator, BatchConfig, PartitionBatch};
pub use loader::{FailedSlice, LoadResult, Loader, Rejection};
