//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Tunables consumed by the core engine.
///
/// Defaults match the production deployment; everything is overridable via
/// the binary's config file / environment layering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Fixed UTC offset applied before deriving calendar fields (minutes).
    #[serde(default)]
    pub utc_offset_minutes: i32,
    /// Records per load batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Idle time after which a session is finalized (seconds).
    #[serde(default = "default_session_inactivity_secs")]
    pub session_inactivity_secs: u64,
    /// Sweep interval for the session finalizer (seconds).
    #[serde(default = "default_session_sweep_secs")]
    pub session_sweep_secs: u64,
    /// Maximum number of deltas queued ahead of the aggregation worker.
    /// This bounds aggregation lag; a full queue backpressures loaders.
    #[serde(default = "default_delta_queue_depth")]
    pub delta_queue_depth: usize,
    /// Queue depth at which a lag warning is emitted.
    #[serde(default = "default_lag_warn_depth")]
    pub lag_warn_depth: usize,
    /// Partitions fully older than this many days may be dropped.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Retention sweep interval (seconds).
    #[serde(default = "default_retention_sweep_secs")]
    pub retention_sweep_secs: u64,
}

fn default_batch_size() -> usize {
    100
}

fn default_session_inactivity_secs() -> u64 {
    30 * 60
}

fn default_session_sweep_secs() -> u64 {
    60
}

fn default_delta_queue_depth() -> usize {
    64
}

fn default_lag_warn_depth() -> usize {
    48
}

fn default_retention_days() -> u32 {
    90
}

fn default_retention_sweep_secs() -> u64 {
    3600
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 0,
            batch_size: default_batch_size(),
            session_inactivity_secs: default_session_inactivity_secs(),
            session_sweep_secs: default_session_sweep_secs(),
            delta_queue_depth: default_delta_queue_depth(),
            lag_warn_depth: default_lag_warn_depth(),
            retention_days: default_retention_days(),
            retention_sweep_secs: default_retention_sweep_secs(),
        }
    }
}
