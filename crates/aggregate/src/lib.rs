//! The aggregation engine.
//!
//! Owns every dimension and rollup entity. All updates are expressed as
//! commutative, associative `observe`/`merge` operations so the order in
//! which committed deltas arrive can never change the final state.

pub mod engine;
pub mod keyed;
pub mod profiles;
pub mod sessions;

pub use engine::{AggregationConfig, AggregationEngine, ApplyReport, EngineSnapshot, RecomputeReport};
pub use keyed::KeyedState;
pub use profiles::*;
pub use sessions::SessionTracker;
