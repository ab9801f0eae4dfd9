//! Raw-record normalization into canonical interaction events.
//!
//! Normalization is purely functional per record: no shared mutable state,
//! so records can be normalized in parallel. Rejections are per-record and
//! never abort a batch.

use chrono::{DateTime, Datelike, FixedOffset, Offset, Timelike, Utc};
use regex::Regex;
use validator::Validate;

use crate::error::NormalizationError;
use crate::events::{Action, InteractionEvent, RawInteraction, ReferrerCategory};

/// Category assigned when no URL rule matches. Never an error.
pub const UNCATEGORIZED: &str = "uncategorized";

/// Fields a record must carry to be normalized at all.
const REQUIRED_FIELDS: [&str; 5] = ["user_id", "session_id", "timestamp", "page_url", "action"];

/// Declarative URL classification rules.
///
/// The first `category` rule whose pattern matches supplies the content
/// category (via its `category` capture group); likewise for `article`
/// rules and the `article` group. Unmatched URLs fall back to
/// [`UNCATEGORIZED`] with no article id.
#[derive(Debug, Clone)]
pub struct UrlClassifier {
    category_rules: Vec<Regex>,
    article_rules: Vec<Regex>,
}

impl UrlClassifier {
    pub fn new(category_rules: Vec<Regex>, article_rules: Vec<Regex>) -> Self {
        Self {
            category_rules,
            article_rules,
        }
    }

    /// Classifies a lowercased page URL into (category, article id).
    pub fn classify(&self, url: &str) -> (String, Option<String>) {
        let category = self
            .category_rules
            .iter()
            .find_map(|rule| {
                rule.captures(url)
                    .and_then(|c| c.name("category"))
                    .map(|m| m.as_str().to_string())
            })
            .unwrap_or_else(|| UNCATEGORIZED.to_string());

        let article_id = self.article_rules.iter().find_map(|rule| {
            rule.captures(url)
                .and_then(|c| c.name("article"))
                .map(|m| m.as_str().to_string())
        });

        (category, article_id)
    }
}

impl Default for UrlClassifier {
    fn default() -> Self {
        // The site layout is news.example.com/<category>/article-<n>.
        let category = Regex::new(r"news\.example\.com/(?P<category>[^/?#]+)").ok();
        let article = Regex::new(r"article-(?P<article>\d+)").ok();
        Self::new(
            category.into_iter().collect(),
            article.into_iter().collect(),
        )
    }
}

/// Normalizer configuration.
#[derive(Debug, Clone)]
pub struct NormalizerConfig {
    /// Fixed UTC offset applied before deriving calendar fields, in minutes.
    /// The policy is configuration, never inferred per record.
    pub utc_offset_minutes: i32,
    /// Referrer hosts classified as internal traffic.
    pub internal_hosts: Vec<String>,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 0,
            internal_hosts: vec!["news.example.com".to_string()],
        }
    }
}

/// Converts decoded raw records into canonical [`InteractionEvent`]s.
pub struct Normalizer {
    config: NormalizerConfig,
    classifier: UrlClassifier,
    offset: FixedOffset,
}

impl Normalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self::with_classifier(config, UrlClassifier::default())
    }

    pub fn with_classifier(config: NormalizerConfig, classifier: UrlClassifier) -> Self {
        let offset =
            FixedOffset::east_opt(config.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix());
        Self {
            config,
            classifier,
            offset,
        }
    }

    /// Normalizes one decoded record.
    pub fn normalize(
        &self,
        raw: &serde_json::Value,
    ) -> std::result::Result<InteractionEvent, NormalizationError> {
        for field in REQUIRED_FIELDS {
            if raw.get(field).map_or(true, |v| v.is_null()) {
                return Err(NormalizationError::MissingField(field));
            }
        }

        let record: RawInteraction = serde_json::from_value(raw.clone())
            .map_err(|e| NormalizationError::Malformed(e.to_string()))?;
        self.normalize_record(record)
    }

    /// Normalizes an already-typed raw record.
    pub fn normalize_record(
        &self,
        record: RawInteraction,
    ) -> std::result::Result<InteractionEvent, NormalizationError> {
        record
            .validate()
            .map_err(|e| NormalizationError::Malformed(e.to_string()))?;

        let timestamp = parse_timestamp(&record.timestamp)?;

        // String fields are lowercased for consistency across sources.
        let user_id = record.user_id.trim().to_lowercase();
        let session_id = record.session_id.trim().to_lowercase();
        let page_url = record.page_url.trim().to_lowercase();
        let action_raw = record.action.trim().to_lowercase();
        let device_type = record
            .device_type
            .as_deref()
            .map(|d| d.trim().to_lowercase())
            .filter(|d| !d.is_empty());
        let referrer = record
            .referrer
            .as_deref()
            .map(|r| r.trim().to_lowercase())
            .filter(|r| !r.is_empty());

        let action = Action::parse(&action_raw)
            .ok_or_else(|| NormalizationError::UnknownAction(action_raw.clone()))?;

        // Calendar derivation under the configured offset.
        let local = timestamp.with_timezone(&self.offset);
        let event_date = local.date_naive();
        let event_dayofweek = local.weekday().num_days_from_monday();

        let (content_category, article_id) = self.classifier.classify(&page_url);
        let referrer_category = self.categorize_referrer(referrer.as_deref());

        // A provided identity passes through; otherwise derive one from
        // stable fields so retried ingestion dedupes on the same key.
        let interaction_id = record
            .interaction_id
            .as_deref()
            .map(|id| id.trim().to_lowercase())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| {
                format!("{}_{}_{}", user_id, session_id, timestamp.timestamp())
            });

        let time_spent_seconds = record
            .time_spent_seconds
            .filter(|v| v.is_finite() && *v >= 0.0);
        let scroll_depth = record.scroll_depth.and_then(normalize_scroll_depth);

        Ok(InteractionEvent {
            interaction_id,
            user_id,
            session_id,
            timestamp,
            page_url,
            action,
            device_type,
            referrer,
            event_date,
            event_time: local.time(),
            event_hour: local.hour(),
            event_day: local.day(),
            event_month: local.month(),
            event_year: local.year(),
            event_dayofweek,
            is_weekend: event_dayofweek >= 5,
            content_category,
            article_id,
            referrer_category,
            time_spent_seconds,
            scroll_depth,
        })
    }

    /// Classifies a referrer into the closed category set.
    fn categorize_referrer(&self, referrer: Option<&str>) -> ReferrerCategory {
        const SEARCH_HOSTS: [&str; 5] = ["google", "bing", "duckduckgo", "yahoo", "search"];
        const SOCIAL_HOSTS: [&str; 7] = [
            "facebook",
            "twitter",
            "instagram",
            "linkedin",
            "reddit",
            "t.co",
            "social",
        ];

        let referrer = match referrer {
            Some(r) if !r.is_empty() => r,
            _ => return ReferrerCategory::Direct,
        };

        let host = url::Url::parse(referrer)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string));

        if let Some(host) = &host {
            let internal = self
                .config
                .internal_hosts
                .iter()
                .any(|h| host == h || host.ends_with(&format!(".{h}")));
            if internal {
                return ReferrerCategory::Internal;
            }
        }

        let haystack = host.as_deref().unwrap_or(referrer);
        if SEARCH_HOSTS.iter().any(|n| haystack.contains(n)) {
            ReferrerCategory::Search
        } else if SOCIAL_HOSTS.iter().any(|n| haystack.contains(n)) {
            ReferrerCategory::Social
        } else {
            ReferrerCategory::Other
        }
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(NormalizerConfig::default())
    }
}

fn parse_timestamp(s: &str) -> std::result::Result<DateTime<Utc>, NormalizationError> {
    DateTime::parse_from_rfc3339(s.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| NormalizationError::InvalidTimestamp {
            value: s.to_string(),
            reason: e.to_string(),
        })
}

/// Scroll depths arrive as either a 0–1 fraction or a 0–100 percentage;
/// store fractions so averages never mix scales. Out-of-range values are
/// absent, not clamped.
fn normalize_scroll_depth(value: f64) -> Option<f64> {
    if !value.is_finite() || value < 0.0 {
        None
    } else if value <= 1.0 {
        Some(value)
    } else if value <= 100.0 {
        Some(value / 100.0)
    } else {
        None
    }
}
