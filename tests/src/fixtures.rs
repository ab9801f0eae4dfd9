//! Raw-record builders and engine wiring for end-to-end tests.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;

use aggregates::{AggregationConfig, AggregationEngine};
use engine_core::{InteractionEvent, Normalizer};
use fact_store::MemoryStore;
use pipeline::{LoadResult, Loader};
use worker::AggregationWorker;

/// A fully-populated raw record.
pub fn record(user: &str, session: &str, timestamp: &str, article: u32, action: &str) -> Value {
    json!({
        "user_id": user,
        "session_id": session,
        "timestamp": timestamp,
        "page_url": format!("https://news.example.com/technology/article-{article}"),
        "action": action,
        "device_type": "mobile",
        "referrer": "https://google.com",
        "time_spent_seconds": 30.0,
        "scroll_depth": 0.8
    })
}

/// `count` unique read events for one user/session on the given day.
pub fn session_records(user: &str, session: &str, day: &str, count: usize) -> Vec<Value> {
    (0..count)
        .map(|i| {
            record(
                user,
                session,
                &format!("{day}T10:{:02}:00Z", i % 60),
                (i % 7 + 1) as u32,
                "read",
            )
        })
        .collect()
}

/// The exact duplicate pair from the dedup scenario: same interaction id,
/// same date, loaded together.
pub fn exact_duplicate_pair() -> Vec<Value> {
    let mut a = record("u1", "s1", "2025-03-05T09:00:00Z", 42, "read");
    a.as_object_mut()
        .unwrap()
        .insert("interaction_id".into(), json!("a1"));
    vec![a.clone(), a]
}

/// A store + engine + loader wired through a real delta queue.
pub struct Rig {
    pub store: Arc<MemoryStore>,
    pub engine: Arc<AggregationEngine>,
    pub loader: Loader,
    rx: mpsc::Receiver<Vec<InteractionEvent>>,
}

impl Rig {
    pub fn new() -> Self {
        Self::with_inactivity(Duration::from_secs(3600))
    }

    pub fn with_inactivity(window: Duration) -> Self {
        let store = Arc::new(MemoryStore::new());
        let engine = Arc::new(AggregationEngine::new(AggregationConfig {
            session_inactivity: window,
        }));
        let (tx, rx) = mpsc::channel(64);
        let loader = Loader::new(store.clone(), Normalizer::default(), tx);
        Self {
            store,
            engine,
            loader,
            rx,
        }
    }

    pub async fn load(&self, records: &[Value]) -> LoadResult {
        self.loader.load(records).await
    }

    /// Closes the delta queue and applies every committed delta, exactly as
    /// the background worker would, then hands back the store and engine.
    pub async fn drain(self) -> (Arc<MemoryStore>, Arc<AggregationEngine>) {
        let Rig {
            store,
            engine,
            loader,
            rx,
        } = self;
        drop(loader);
        AggregationWorker::new(engine.clone(), usize::MAX).run(rx).await;
        (store, engine)
    }
}

impl Default for Rig {
    fn default() -> Self {
        Self::new()
    }
}
