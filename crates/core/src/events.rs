//! Event type definitions for the analytics engine.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// A decoded raw interaction record, as delivered by the extractor.
///
/// Only shape and bounds are enforced here; semantic checks (timestamp
/// parsing, action set, value ranges) happen during normalization.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RawInteraction {
    #[validate(length(min = 1, max = 255))]
    pub user_id: String,
    #[validate(length(min = 1, max = 255))]
    pub session_id: String,
    /// RFC 3339 timestamp string
    pub timestamp: String,
    #[validate(length(min = 1, max = 2048))]
    pub page_url: String,
    #[validate(length(min = 1, max = 50))]
    pub action: String,
    #[validate(length(max = 50))]
    pub device_type: Option<String>,
    #[validate(length(max = 2048))]
    pub referrer: Option<String>,
    /// Client-assigned identity, if any; derived during normalization otherwise
    #[validate(length(max = 255))]
    pub interaction_id: Option<String>,
    pub time_spent_seconds: Option<f64>,
    pub scroll_depth: Option<f64>,
}

/// Interaction kinds the tracker emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Read,
    Share,
    Like,
    Comment,
    View,
    VideoPlay,
    Bookmark,
}

impl Action {
    /// Returns the action as its wire string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Share => "share",
            Self::Like => "like",
            Self::Comment => "comment",
            Self::View => "view",
            Self::VideoPlay => "video_play",
            Self::Bookmark => "bookmark",
        }
    }

    /// Parses a lowercase wire string into an action.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "read" => Some(Self::Read),
            "share" => Some(Self::Share),
            "like" => Some(Self::Like),
            "comment" => Some(Self::Comment),
            "view" => Some(Self::View),
            "video_play" => Some(Self::VideoPlay),
            "bookmark" => Some(Self::Bookmark),
            _ => None,
        }
    }
}

/// Closed referrer classification set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferrerCategory {
    Search,
    Social,
    Direct,
    Internal,
    Other,
}

impl ReferrerCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Social => "social",
            Self::Direct => "direct",
            Self::Internal => "internal",
            Self::Other => "other",
        }
    }
}

/// Composite fact identity: unique per event date, not globally.
///
/// Two events carrying the same `interaction_id` on different dates are
/// distinct records by design and must not collide.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FactKey {
    pub event_date: NaiveDate,
    pub interaction_id: String,
}

/// A canonical interaction event, immutable once committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionEvent {
    /// Deterministic identity; re-normalizing the same raw record yields
    /// the same value.
    pub interaction_id: String,
    pub user_id: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub page_url: String,
    pub action: Action,
    pub device_type: Option<String>,
    pub referrer: Option<String>,

    // Calendar fields, pure functions of the timestamp under the
    // configured time-zone policy.
    pub event_date: NaiveDate,
    pub event_time: NaiveTime,
    pub event_hour: u32,
    pub event_day: u32,
    pub event_month: u32,
    pub event_year: i32,
    /// Monday = 0 .. Sunday = 6
    pub event_dayofweek: u32,
    pub is_weekend: bool,

    // URL/referrer derivations.
    pub content_category: String,
    pub article_id: Option<String>,
    pub referrer_category: ReferrerCategory,

    // Engagement measures; absent (not zero) when the tracker did not
    // report them, so averages stay honest.
    pub time_spent_seconds: Option<f64>,
    pub scroll_depth: Option<f64>,
}

impl InteractionEvent {
    /// Returns the composite identity used for deduplication.
    pub fn fact_key(&self) -> FactKey {
        FactKey {
            event_date: self.event_date,
            interaction_id: self.interaction_id.clone(),
        }
    }
}
