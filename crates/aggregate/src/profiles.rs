//! Dimension and rollup entities.
//!
//! Every entity is built from two commutative, associative operations:
//! `observe` folds in one event, `merge` folds in another instance of the
//! same entity. Monotonic fields use min/max, counts use sums, distinct
//! counts use set union, and "preferred"/"dominant" fields are derived from
//! counter maps with a deterministic tie-break. Because of this, applying
//! deltas in any order converges to the same state as a full recompute.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use engine_core::InteractionEvent;

/// Running average kept as count + sum, so repeated incremental updates
/// cannot drift from a recompute the way a re-averaged float would.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunningAvg {
    pub count: u64,
    pub sum: f64,
}

impl RunningAvg {
    pub fn observe(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
    }

    pub fn merge(&mut self, other: &RunningAvg) {
        self.count += other.count;
        self.sum += other.sum;
    }

    /// `None` until at least one value was observed; absent inputs never
    /// count as zero.
    pub fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum / self.count as f64)
        }
    }
}

/// Occurrence counts with a deterministic mode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CounterMap(BTreeMap<String, u64>);

impl CounterMap {
    pub fn observe(&mut self, key: impl Into<String>) {
        *self.0.entry(key.into()).or_default() += 1;
    }

    pub fn merge(&mut self, other: &CounterMap) {
        for (key, n) in &other.0 {
            *self.0.entry(key.clone()).or_default() += n;
        }
    }

    /// The most frequent key; ties resolve to the lexicographically
    /// smallest so the result is independent of apply order.
    pub fn mode(&self) -> Option<&str> {
        self.0
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(key, _)| key.as_str())
    }

    pub fn count(&self, key: &str) -> u64 {
        self.0.get(key).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A timestamped page touch, ordered by (timestamp, interaction_id) so
/// "earliest" and "latest" stay unambiguous for equal timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageTouch {
    pub at: DateTime<Utc>,
    pub interaction_id: String,
    pub page_url: String,
}

impl PageTouch {
    fn of(event: &InteractionEvent) -> Self {
        Self {
            at: event.timestamp,
            interaction_id: event.interaction_id.clone(),
            page_url: event.page_url.clone(),
        }
    }

    fn is_before(&self, other: &PageTouch) -> bool {
        (self.at, &self.interaction_id) < (other.at, &other.interaction_id)
    }
}

/// Keeps the earliest of two optional touches.
fn keep_earliest(slot: &mut Option<PageTouch>, touch: PageTouch) {
    match slot {
        Some(current) if !touch.is_before(current) => {}
        _ => *slot = Some(touch),
    }
}

/// Keeps the latest of two optional touches.
fn keep_latest(slot: &mut Option<PageTouch>, touch: PageTouch) {
    match slot {
        Some(current) if !current.is_before(&touch) => {}
        _ => *slot = Some(touch),
    }
}

fn min_opt(slot: &mut Option<DateTime<Utc>>, value: DateTime<Utc>) {
    *slot = Some(slot.map_or(value, |t| t.min(value)));
}

fn max_opt(slot: &mut Option<DateTime<Utc>>, value: DateTime<Utc>) {
    *slot = Some(slot.map_or(value, |t| t.max(value)));
}

/// Per-user dimension entity. Mutated only by the aggregation engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Monotonically widens: min over observed timestamps.
    pub first_seen: Option<DateTime<Utc>>,
    /// Monotonically widens: max over observed timestamps.
    pub last_seen: Option<DateTime<Utc>>,
    pub sessions: HashSet<String>,
    pub total_interactions: u64,
    pub devices: CounterMap,
    pub categories: CounterMap,
}

impl UserProfile {
    pub fn observe(&mut self, event: &InteractionEvent) {
        min_opt(&mut self.first_seen, event.timestamp);
        max_opt(&mut self.last_seen, event.timestamp);
        self.sessions.insert(event.session_id.clone());
        self.total_interactions += 1;
        if let Some(device) = &event.device_type {
            self.devices.observe(device.clone());
        }
        self.categories.observe(event.content_category.clone());
    }

    pub fn merge(&mut self, other: &UserProfile) {
        if let Some(t) = other.first_seen {
            min_opt(&mut self.first_seen, t);
        }
        if let Some(t) = other.last_seen {
            max_opt(&mut self.last_seen, t);
        }
        self.sessions.extend(other.sessions.iter().cloned());
        self.total_interactions += other.total_interactions;
        self.devices.merge(&other.devices);
        self.categories.merge(&other.categories);
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Mode over device history.
    pub fn preferred_device(&self) -> Option<&str> {
        self.devices.mode()
    }

    /// Mode over category history.
    pub fn preferred_content_category(&self) -> Option<&str> {
        self.categories.mode()
    }
}

/// Per-article dimension entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentProfile {
    /// Categories seen for this article; normally a single entry, but kept
    /// as counts so apply order cannot matter if URLs disagree.
    pub categories: CounterMap,
    /// Earliest observed touch; supplies the representative full URL.
    pub first_touch: Option<PageTouch>,
    pub total_views: u64,
    /// Exact distinct visitors (see DESIGN.md for the exact-vs-approximate
    /// decision). Never an estimate presented as exact.
    pub visitors: HashSet<String>,
    /// Maintained as count + sum; no history re-scan per update.
    pub time_spent: RunningAvg,
}

impl ContentProfile {
    pub fn observe(&mut self, event: &InteractionEvent) {
        self.categories.observe(event.content_category.clone());
        keep_earliest(&mut self.first_touch, PageTouch::of(event));
        self.total_views += 1;
        self.visitors.insert(event.user_id.clone());
        if let Some(seconds) = event.time_spent_seconds {
            self.time_spent.observe(seconds);
        }
    }

    pub fn merge(&mut self, other: &ContentProfile) {
        self.categories.merge(&other.categories);
        if let Some(touch) = &other.first_touch {
            keep_earliest(&mut self.first_touch, touch.clone());
        }
        self.total_views += other.total_views;
        self.visitors.extend(other.visitors.iter().cloned());
        self.time_spent.merge(&other.time_spent);
    }

    pub fn content_category(&self) -> Option<&str> {
        self.categories.mode()
    }

    pub fn full_url(&self) -> Option<&str> {
        self.first_touch.as_ref().map(|t| t.page_url.as_str())
    }

    pub fn distinct_visitors(&self) -> usize {
        self.visitors.len()
    }

    pub fn avg_time_spent(&self) -> Option<f64> {
        self.time_spent.mean()
    }
}

/// Per-session dimension entity.
///
/// `ended_at` and `duration` are provisional until `closed` is set by the
/// session finalizer; a late event reopens the session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionProfile {
    pub user_id: String,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub page_count: u64,
    pub entry: Option<PageTouch>,
    pub exit: Option<PageTouch>,
    pub devices: CounterMap,
    pub referrers: CounterMap,
    pub closed: bool,
}

impl SessionProfile {
    pub fn observe(&mut self, event: &InteractionEvent) {
        if self.user_id.is_empty() {
            self.user_id = event.user_id.clone();
        }
        min_opt(&mut self.started_at, event.timestamp);
        max_opt(&mut self.ended_at, event.timestamp);
        self.page_count += 1;
        keep_earliest(&mut self.entry, PageTouch::of(event));
        keep_latest(&mut self.exit, PageTouch::of(event));
        if let Some(device) = &event.device_type {
            self.devices.observe(device.clone());
        }
        self.referrers.observe(event.referrer_category.as_str());
    }

    pub fn merge(&mut self, other: &SessionProfile) {
        if self.user_id.is_empty() {
            self.user_id = other.user_id.clone();
        }
        if let Some(t) = other.started_at {
            min_opt(&mut self.started_at, t);
        }
        if let Some(t) = other.ended_at {
            max_opt(&mut self.ended_at, t);
        }
        self.page_count += other.page_count;
        if let Some(touch) = &other.entry {
            keep_earliest(&mut self.entry, touch.clone());
        }
        if let Some(touch) = &other.exit {
            keep_latest(&mut self.exit, touch.clone());
        }
        self.devices.merge(&other.devices);
        self.referrers.merge(&other.referrers);
    }

    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }

    pub fn entry_page(&self) -> Option<&str> {
        self.entry.as_ref().map(|t| t.page_url.as_str())
    }

    pub fn exit_page(&self) -> Option<&str> {
        self.exit.as_ref().map(|t| t.page_url.as_str())
    }

    pub fn dominant_device(&self) -> Option<&str> {
        self.devices.mode()
    }

    pub fn dominant_referrer(&self) -> Option<&str> {
        self.referrers.mode()
    }
}

/// Daily activity rollup, derived strictly from facts of one event date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyUserAggregate {
    pub total_interactions: u64,
    /// Exact distinct users active on the day.
    pub visitors: HashSet<String>,
    pub sessions: HashSet<String>,
    pub actions: BTreeMap<String, u64>,
    pub time_spent: RunningAvg,
}

impl DailyUserAggregate {
    pub fn observe(&mut self, event: &InteractionEvent) {
        self.total_interactions += 1;
        self.visitors.insert(event.user_id.clone());
        self.sessions.insert(event.session_id.clone());
        *self
            .actions
            .entry(event.action.as_str().to_string())
            .or_default() += 1;
        if let Some(seconds) = event.time_spent_seconds {
            self.time_spent.observe(seconds);
        }
    }

    pub fn merge(&mut self, other: &DailyUserAggregate) {
        self.total_interactions += other.total_interactions;
        self.visitors.extend(other.visitors.iter().cloned());
        self.sessions.extend(other.sessions.iter().cloned());
        for (action, n) in &other.actions {
            *self.actions.entry(action.clone()).or_default() += n;
        }
        self.time_spent.merge(&other.time_spent);
    }

    pub fn active_users(&self) -> usize {
        self.visitors.len()
    }
}

/// Per-article-per-day rollup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArticlePerformanceAggregate {
    pub views: u64,
    /// Exact distinct visitors on the day.
    pub visitors: HashSet<String>,
    pub time_spent: RunningAvg,
    pub scroll_depth: RunningAvg,
}

impl ArticlePerformanceAggregate {
    pub fn observe(&mut self, event: &InteractionEvent) {
        self.views += 1;
        self.visitors.insert(event.user_id.clone());
        if let Some(seconds) = event.time_spent_seconds {
            self.time_spent.observe(seconds);
        }
        if let Some(depth) = event.scroll_depth {
            self.scroll_depth.observe(depth);
        }
    }

    pub fn merge(&mut self, other: &ArticlePerformanceAggregate) {
        self.views += other.views;
        self.visitors.extend(other.visitors.iter().cloned());
        self.time_spent.merge(&other.time_spent);
        self.scroll_depth.merge(&other.scroll_depth);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use engine_core::{Action, ReferrerCategory};

    fn event_at(id: &str, secs: i64, user: &str) -> InteractionEvent {
        let timestamp = Utc.timestamp_opt(1_741_168_800 + secs, 0).unwrap();
        InteractionEvent {
            interaction_id: id.to_string(),
            user_id: user.to_string(),
            session_id: "s1".into(),
            timestamp,
            page_url: format!("https://news.example.com/tech/article-{id}"),
            action: Action::Read,
            device_type: Some("mobile".into()),
            referrer: None,
            event_date: timestamp.date_naive(),
            event_time: timestamp.time(),
            event_hour: 10,
            event_day: 5,
            event_month: 3,
            event_year: 2025,
            event_dayofweek: 2,
            is_weekend: false,
            content_category: "tech".into(),
            article_id: Some("42".into()),
            referrer_category: ReferrerCategory::Direct,
            time_spent_seconds: Some(30.0),
            scroll_depth: Some(0.5),
        }
    }

    #[test]
    fn running_avg_matches_full_recompute() {
        let mut incremental = RunningAvg::default();
        let values = [3.0, 7.5, 12.25, 0.5, 100.0];
        for v in values {
            incremental.observe(v);
        }
        let expected: f64 = values.iter().sum::<f64>() / values.len() as f64;
        assert_eq!(incremental.mean(), Some(expected));
        assert_eq!(RunningAvg::default().mean(), None);
    }

    #[test]
    fn counter_map_mode_breaks_ties_deterministically() {
        let mut forward = CounterMap::default();
        forward.observe("mobile");
        forward.observe("desktop");

        let mut backward = CounterMap::default();
        backward.observe("desktop");
        backward.observe("mobile");

        assert_eq!(forward.mode(), Some("desktop"));
        assert_eq!(forward.mode(), backward.mode());
    }

    #[test]
    fn user_profile_widens_monotonically() {
        let mut profile = UserProfile::default();
        profile.observe(&event_at("b", 100, "u1"));
        profile.observe(&event_at("a", 0, "u1"));
        profile.observe(&event_at("c", 200, "u1"));

        assert_eq!(profile.total_interactions, 3);
        assert!(profile.first_seen.unwrap() < profile.last_seen.unwrap());
        assert_eq!(profile.preferred_device(), Some("mobile"));
    }

    #[test]
    fn observe_order_does_not_change_profiles() {
        let events = [
            event_at("a", 0, "u1"),
            event_at("b", 60, "u1"),
            event_at("c", 120, "u1"),
        ];

        let mut forward = SessionProfile::default();
        for e in &events {
            forward.observe(e);
        }
        let mut backward = SessionProfile::default();
        for e in events.iter().rev() {
            backward.observe(e);
        }

        assert_eq!(forward, backward);
        assert_eq!(forward.entry_page(), backward.entry_page());
        assert_eq!(forward.exit_page(), backward.exit_page());
    }

    #[test]
    fn merge_is_equivalent_to_sequential_observe() {
        let events: Vec<_> = (0..6).map(|i| event_at(&format!("e{i}"), i * 10, "u1")).collect();

        let mut whole = ContentProfile::default();
        for e in &events {
            whole.observe(e);
        }

        let mut left = ContentProfile::default();
        let mut right = ContentProfile::default();
        for e in &events[..3] {
            left.observe(e);
        }
        for e in &events[3..] {
            right.observe(e);
        }
        left.merge(&right);

        assert_eq!(whole, left);
    }

    #[test]
    fn entry_and_exit_break_timestamp_ties_by_id() {
        let mut profile = SessionProfile::default();
        // Same timestamp, different ids: "a" must win entry, "b" exit.
        profile.observe(&event_at("b", 0, "u1"));
        profile.observe(&event_at("a", 0, "u1"));

        assert_eq!(
            profile.entry.as_ref().map(|t| t.interaction_id.as_str()),
            Some("a")
        );
        assert_eq!(
            profile.exit.as_ref().map(|t| t.interaction_id.as_str()),
            Some("b")
        );
    }

    #[test]
    fn distinct_visitor_counts_are_exact_under_repeats() {
        let mut daily = DailyUserAggregate::default();
        for _ in 0..3 {
            daily.observe(&event_at("x", 0, "u1"));
        }
        daily.observe(&event_at("y", 0, "u2"));

        assert_eq!(daily.total_interactions, 4);
        assert_eq!(daily.active_users(), 2);
        assert_eq!(daily.actions.get("read"), Some(&4));
    }

    #[test]
    fn absent_engagement_values_do_not_skew_averages() {
        let mut article = ArticlePerformanceAggregate::default();
        let mut event = event_at("a", 0, "u1");
        event.time_spent_seconds = None;
        article.observe(&event);
        let mut event = event_at("b", 10, "u2");
        event.time_spent_seconds = Some(60.0);
        article.observe(&event);

        assert_eq!(article.views, 2);
        assert_eq!(article.time_spent.mean(), Some(60.0));
    }
}
