//! Incremental apply and full recompute over committed facts.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use chrono::NaiveDate;
use tracing::{info, warn};

use engine_core::{InteractionEvent, Result};
use fact_store::{DateRange, FactStore};

use crate::keyed::KeyedState;
use crate::profiles::{
    ArticlePerformanceAggregate, ContentProfile, DailyUserAggregate, SessionProfile, UserProfile,
};
use crate::sessions::SessionTracker;

/// Aggregation tunables.
#[derive(Debug, Clone)]
pub struct AggregationConfig {
    /// Wall-clock idle time after which a session is finalized.
    pub session_inactivity: Duration,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            session_inactivity: Duration::from_secs(30 * 60),
        }
    }
}

/// Outcome of one `apply_delta` call.
#[derive(Debug, Default, Clone, Copy)]
pub struct ApplyReport {
    pub applied: usize,
    /// Events whose session merge was impossible; recorded, never fatal.
    pub conflicts: usize,
}

/// Outcome of one `recompute` call.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecomputeReport {
    pub events: usize,
    pub users: usize,
    pub articles: usize,
    pub sessions: usize,
    pub conflicts: usize,
}

/// Exclusive owner of every dimension and aggregate entity.
///
/// `apply_delta` consumes post-commit deltas (newly-inserted rows only), so
/// retried loads can never double-count; `recompute` rebuilds the same
/// state from the fact store directly. Per-key entry locks serialize
/// concurrent same-key updates, and every update is commutative, so the two
/// paths converge for any apply order.
pub struct AggregationEngine {
    users: KeyedState<String, UserProfile>,
    content: KeyedState<String, ContentProfile>,
    daily: KeyedState<NaiveDate, DailyUserAggregate>,
    article_daily: KeyedState<(String, NaiveDate), ArticlePerformanceAggregate>,
    sessions: SessionTracker,
}

/// A consistent, comparable copy of the full aggregate state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EngineSnapshot {
    pub users: BTreeMap<String, UserProfile>,
    pub content: BTreeMap<String, ContentProfile>,
    pub sessions: BTreeMap<String, SessionProfile>,
    pub daily: BTreeMap<NaiveDate, DailyUserAggregate>,
    pub article_daily: BTreeMap<(String, NaiveDate), ArticlePerformanceAggregate>,
}

impl AggregationEngine {
    pub fn new(config: AggregationConfig) -> Self {
        Self {
            users: KeyedState::new(),
            content: KeyedState::new(),
            daily: KeyedState::new(),
            article_daily: KeyedState::new(),
            sessions: SessionTracker::new(config.session_inactivity),
        }
    }

    /// Folds one committed delta into every affected entity.
    pub fn apply_delta(&self, new_events: &[InteractionEvent]) -> ApplyReport {
        let mut report = ApplyReport::default();
        for event in new_events {
            self.users
                .update(&event.user_id, |profile| profile.observe(event));
            if let Some(article_id) = &event.article_id {
                self.content
                    .update(article_id, |profile| profile.observe(event));
                self.article_daily
                    .update(&(article_id.clone(), event.event_date), |agg| {
                        agg.observe(event)
                    });
            }
            self.daily
                .update(&event.event_date, |agg| agg.observe(event));
            if let Err(e) = self.sessions.observe(event) {
                warn!(
                    session_id = %event.session_id,
                    interaction_id = %event.interaction_id,
                    error = %e,
                    "aggregation conflict; event skipped for session state"
                );
                report.conflicts += 1;
            }
            report.applied += 1;
        }
        report
    }

    /// Rebuilds aggregates for `range` from the fact store directly.
    ///
    /// Day rollups are strictly per-date and are replayed from range events
    /// alone. User and content profiles span dates, so every key touched by
    /// the range is re-derived from its full committed history; session
    /// profiles touched by the range are replayed from the range (sessions
    /// are inactivity-bounded, so a recompute range covers them).
    pub async fn recompute(
        &self,
        range: DateRange,
        store: &dyn FactStore,
    ) -> Result<RecomputeReport> {
        let events = store.events_in_range(range).await?;

        let mut users = BTreeSet::new();
        let mut articles = BTreeSet::new();
        let mut touched_sessions = BTreeSet::new();
        for event in &events {
            users.insert(event.user_id.clone());
            if let Some(article_id) = &event.article_id {
                articles.insert(article_id.clone());
            }
            touched_sessions.insert(event.session_id.clone());
        }

        self.daily.remove_matching(|date| range.contains(*date));
        self.article_daily
            .remove_matching(|(_, date)| range.contains(*date));
        for event in &events {
            self.daily
                .update(&event.event_date, |agg| agg.observe(event));
            if let Some(article_id) = &event.article_id {
                self.article_daily
                    .update(&(article_id.clone(), event.event_date), |agg| {
                        agg.observe(event)
                    });
            }
        }

        for user_id in &users {
            let history = store.events_for_user(user_id).await?;
            let mut profile = UserProfile::default();
            for event in &history {
                profile.observe(event);
            }
            self.users.replace(user_id.clone(), profile);
        }

        for article_id in &articles {
            let history = store.events_for_article(article_id).await?;
            let mut profile = ContentProfile::default();
            for event in &history {
                profile.observe(event);
            }
            self.content.replace(article_id.clone(), profile);
        }

        self.sessions.reset(touched_sessions.iter().cloned());
        let mut conflicts = 0;
        for event in &events {
            if self.sessions.observe(event).is_err() {
                conflicts += 1;
            }
        }

        let report = RecomputeReport {
            events: events.len(),
            users: users.len(),
            articles: articles.len(),
            sessions: touched_sessions.len(),
            conflicts,
        };
        info!(
            start = %range.start,
            end = %range.end,
            events = report.events,
            users = report.users,
            articles = report.articles,
            "recompute complete"
        );
        Ok(report)
    }

    // Read-only keyed lookups for downstream consumers.

    pub fn user_profile(&self, user_id: &str) -> Option<UserProfile> {
        self.users.get(&user_id.to_string())
    }

    pub fn content_profile(&self, article_id: &str) -> Option<ContentProfile> {
        self.content.get(&article_id.to_string())
    }

    pub fn session_profile(&self, session_id: &str) -> Option<SessionProfile> {
        self.sessions.profile(session_id)
    }

    pub fn daily_aggregate(&self, date: NaiveDate) -> Option<DailyUserAggregate> {
        self.daily.get(&date)
    }

    pub fn article_performance(
        &self,
        article_id: &str,
        date: NaiveDate,
    ) -> Option<ArticlePerformanceAggregate> {
        self.article_daily.get(&(article_id.to_string(), date))
    }

    /// Daily aggregates inside the range, sorted by date.
    pub fn daily_in_range(&self, range: DateRange) -> Vec<(NaiveDate, DailyUserAggregate)> {
        let mut rows: Vec<_> = self
            .daily
            .snapshot()
            .into_iter()
            .filter(|(date, _)| range.contains(*date))
            .collect();
        rows.sort_by_key(|(date, _)| *date);
        rows
    }

    // Session lifecycle, driven by the worker sweeps.

    pub fn finalize_idle_sessions(&self) -> usize {
        self.sessions.finalize_idle()
    }

    pub fn finalize_all_sessions(&self) -> usize {
        self.sessions.finalize_all()
    }

    pub fn open_session_count(&self) -> usize {
        self.sessions.open_count()
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn content_count(&self) -> usize {
        self.content.len()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.total_count()
    }

    pub fn daily_count(&self) -> usize {
        self.daily.len()
    }

    /// Clones the full aggregate state for comparison or export.
    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            users: self.users.snapshot().into_iter().collect(),
            content: self.content.snapshot().into_iter().collect(),
            sessions: self.sessions.snapshot().into_iter().collect(),
            daily: self.daily.snapshot().into_iter().collect(),
            article_daily: self.article_daily.snapshot().into_iter().collect(),
        }
    }
}

impl Default for AggregationEngine {
    fn default() -> Self {
        Self::new(AggregationConfig::default())
    }
}
