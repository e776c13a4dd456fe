use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A channel as persisted by the ranking store.
///
/// Rank is deliberately absent: it is a function of sort order and page
/// offset and is assigned when a page is served.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub id: String,
    pub display_name: String,
    pub handle: Option<String>,
    pub image_url: Option<String>,
    pub description: Option<String>,
    pub subscriber_count: u64,
    pub total_view_count: u64,
    pub video_count: u64,
    /// Two-letter region code, always resolved before persistence.
    pub country: String,
    pub category_id: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// A stored channel together with its week-over-week deltas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredChannel {
    #[serde(flatten)]
    pub record: ChannelRecord,
    pub weekly_subscriber_change: i64,
    pub weekly_view_change: i64,
}

impl StoredChannel {
    /// Wraps a record with zero weekly change, for channels seen only once.
    #[must_use]
    pub fn fresh(record: ChannelRecord) -> Self {
        Self {
            record,
            weekly_subscriber_change: 0,
            weekly_view_change: 0,
        }
    }

    #[must_use]
    pub fn engagement_rate(&self) -> f64 {
        engagement_rate(&self.record)
    }
}

/// Average views per video relative to the subscriber base.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn engagement_rate(record: &ChannelRecord) -> f64 {
    let per_video = record.total_view_count as f64 / record.video_count.max(1) as f64;
    per_video / record.subscriber_count.max(1) as f64
}

/// Sort keys accepted by the ranking query API. Every key sorts descending.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Subscribers,
    WeeklySubscribers,
    Views,
    WeeklyViews,
    Engagement,
}

impl SortKey {
    pub const ALL: [SortKey; 5] = [
        SortKey::Subscribers,
        SortKey::WeeklySubscribers,
        SortKey::Views,
        SortKey::WeeklyViews,
        SortKey::Engagement,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SortKey::Subscribers => "subscribers",
            SortKey::WeeklySubscribers => "weekly_subscribers",
            SortKey::Views => "views",
            SortKey::WeeklyViews => "weekly_views",
            SortKey::Engagement => "engagement",
        }
    }

    /// Ranking order for two channels: descending on the key, ties broken by
    /// ascending id so pages are stable.
    #[must_use]
    pub fn compare(self, a: &StoredChannel, b: &StoredChannel) -> Ordering {
        let primary = match self {
            SortKey::Subscribers => b.record.subscriber_count.cmp(&a.record.subscriber_count),
            SortKey::WeeklySubscribers => b
                .weekly_subscriber_change
                .cmp(&a.weekly_subscriber_change),
            SortKey::Views => b.record.total_view_count.cmp(&a.record.total_view_count),
            SortKey::WeeklyViews => b.weekly_view_change.cmp(&a.weekly_view_change),
            SortKey::Engagement => b.engagement_rate().total_cmp(&a.engagement_rate()),
        };
        primary.then_with(|| a.record.id.cmp(&b.record.id))
    }
}

impl std::str::FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        SortKey::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                let accepted: Vec<&str> = SortKey::ALL.iter().map(|k| k.as_str()).collect();
                format!("unknown sort key '{wanted}'; expected one of {}", accepted.join(", "))
            })
    }
}

impl std::fmt::Display for SortKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Region/category partition of a ranking query. `None` means "any".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RankingFilter {
    pub country: Option<String>,
    pub category: Option<String>,
}

impl RankingFilter {
    /// Uppercases the country, lowercases the category, and drops blanks.
    #[must_use]
    pub fn normalized(&self) -> Self {
        let clean = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToOwned::to_owned)
        };
        Self {
            country: clean(&self.country).map(|c| c.to_ascii_uppercase()),
            category: clean(&self.category).map(|c| c.to_ascii_lowercase()),
        }
    }

    #[must_use]
    pub fn matches(&self, record: &ChannelRecord) -> bool {
        self.country
            .as_deref()
            .is_none_or(|c| record.country.eq_ignore_ascii_case(c))
            && self
                .category
                .as_deref()
                .is_none_or(|c| record.category_id == c)
    }
}

/// One-based page coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.page.max(1) - 1) * u64::from(self.page_size)
    }
}
