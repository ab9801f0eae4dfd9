//! Internal telemetry for the media analytics engine.
//!
//! Metrics are collected in-process with atomics and surfaced through
//! periodic structured-log snapshots rather than an external metrics system.

pub mod metrics;
pub mod tracing_setup;

pub use metrics::*;
pub use tracing_setup::*;
