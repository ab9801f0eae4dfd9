//! Media Analytics Engine
//!
//! One-shot ETL over a directory of decoded interaction records:
//! - normalization with per-record rejection
//! - month-partitioned idempotent loading into the fact store
//! - asynchronous incremental aggregation behind a bounded delta queue
//! - session finalization and partition retention sweeps

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{info, warn};

use aggregates::{AggregationConfig, AggregationEngine};
use engine_core::{EngineConfig, Normalizer, NormalizerConfig};
use fact_store::{FactStore, MemoryStore};
use pipeline::Loader;
use telemetry::{init_tracing_from_env, metrics};
use worker::{WorkerConfig, WorkerScheduler};

mod extract;

/// Application configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Config {
    #[serde(default = "default_data_dir")]
    data_dir: String,

    #[serde(default)]
    engine: EngineConfig,
}

fn default_data_dir() -> String {
    "./data".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            engine: EngineConfig::default(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing_from_env();

    info!(
        "Starting media analytics engine v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = load_config()?;
    info!(
        data_dir = %config.data_dir,
        batch_size = config.engine.batch_size,
        utc_offset_minutes = config.engine.utc_offset_minutes,
        "loaded configuration"
    );

    let store: Arc<dyn FactStore> = Arc::new(MemoryStore::new());
    let engine = Arc::new(AggregationEngine::new(AggregationConfig {
        session_inactivity: Duration::from_secs(config.engine.session_inactivity_secs),
    }));

    // The queue bound is the aggregation-lag bound: a full queue
    // backpressures the loader instead of dropping deltas.
    let (delta_tx, delta_rx) = mpsc::channel(config.engine.delta_queue_depth.max(1));

    let normalizer = Normalizer::new(NormalizerConfig {
        utc_offset_minutes: config.engine.utc_offset_minutes,
        ..Default::default()
    });
    let loader = Loader::new(store.clone(), normalizer, delta_tx);

    let scheduler = WorkerScheduler::new(
        WorkerConfig {
            session_sweep: Duration::from_secs(config.engine.session_sweep_secs),
            retention_sweep: Duration::from_secs(config.engine.retention_sweep_secs),
            retention_days: config.engine.retention_days,
            lag_warn_depth: config.engine.lag_warn_depth,
            metrics_log_interval: Duration::from_secs(60),
        },
        engine.clone(),
        store.clone(),
    );
    let handles = scheduler.start(delta_rx);

    // Run the load loop, bailing out early on Ctrl+C; committed slices stay
    // committed and aggregation stays consistent either way.
    tokio::select! {
        result = run_etl(&config, &loader) => result?,
        _ = shutdown_signal() => warn!("interrupted; stopping after the current batch"),
    }

    // Dropping the loader closes the delta queue; drain lets the
    // aggregation worker finish every committed delta before we report.
    drop(loader);
    handles.drain().await;

    let finalized = engine.finalize_all_sessions();
    let snapshot = metrics().snapshot();
    info!(
        records_decoded = snapshot.records_decoded,
        rows_inserted = snapshot.rows_inserted,
        duplicate_rows = snapshot.duplicate_rows,
        records_rejected = snapshot.records_rejected,
        partitions_created = snapshot.partitions_created,
        users = engine.user_count(),
        articles = engine.content_count(),
        sessions = engine.session_count(),
        days = engine.daily_count(),
        sessions_finalized = finalized,
        "run complete"
    );

    Ok(())
}

/// Extracts the data directory and loads it batch by batch.
async fn run_etl(config: &Config, loader: &Loader) -> Result<()> {
    let records = extract::extract_dir(Path::new(&config.data_dir))?;
    if records.is_empty() {
        warn!("nothing to load");
        return Ok(());
    }
    info!(records = records.len(), "extraction complete");

    for chunk in records.chunks(config.engine.batch_size.max(1)) {
        let result = loader.load(chunk).await;
        for slice in &result.failed_slices {
            warn!(
                partition = %slice.partition,
                events = slice.events.len(),
                error = %slice.error,
                "slice failed; resubmit the batch to retry"
            );
        }
    }
    Ok(())
}

/// Load configuration from files and environment.
fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        // Start with defaults
        .add_source(config::Config::try_from(&Config::default())?)
        // Load from config file if exists
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        // Override with environment variables (ANALYTICS_DATA_DIR,
        // ANALYTICS_ENGINE__BATCH_SIZE, ...)
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix("ANALYTICS")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    config
        .try_deserialize()
        .context("Failed to deserialize configuration")
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
