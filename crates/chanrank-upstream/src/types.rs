//! Wire types for the upstream API plus the normalized shapes handed to callers.
//!
//! The upstream serialises every statistic as a JSON string (`"1234"`), may
//! omit `subscriberCount` when a channel hides it, and nests search hits under
//! `id.channelId`.

use serde::{Deserialize, Deserializer};

// ---------------------------------------------------------------------------
// search
// ---------------------------------------------------------------------------

/// Result ordering accepted by the search endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SearchOrder {
    #[default]
    ViewCount,
    Relevance,
    Rating,
    Date,
}

impl SearchOrder {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SearchOrder::ViewCount => "viewCount",
            SearchOrder::Relevance => "relevance",
            SearchOrder::Rating => "rating",
            SearchOrder::Date => "date",
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchListResponse {
    #[serde(rename = "nextPageToken")]
    pub next_page_token: Option<String>,
    #[serde(default)]
    pub items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchItem {
    #[serde(default)]
    pub id: SearchItemId,
    #[serde(default)]
    pub snippet: Option<SearchSnippet>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SearchItemId {
    #[serde(rename = "channelId")]
    pub channel_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchSnippet {
    #[serde(rename = "channelId")]
    pub channel_id: Option<String>,
}

impl SearchItem {
    /// Channel id of the hit; video hits carry it only in the snippet.
    pub(crate) fn channel_id(self) -> Option<String> {
        self.id
            .channel_id
            .or_else(|| self.snippet.and_then(|s| s.channel_id))
            .filter(|id| !id.trim().is_empty())
    }
}

/// One page of search hits, reduced to candidate channel ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPage {
    pub channel_ids: Vec<String>,
    pub next_page_token: Option<String>,
}

// ---------------------------------------------------------------------------
// channels
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct ChannelListResponse {
    #[serde(default)]
    pub items: Vec<ChannelItem>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChannelItem {
    pub id: String,
    #[serde(default)]
    pub snippet: ChannelSnippet,
    #[serde(default)]
    pub statistics: ChannelStatistics,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ChannelSnippet {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "customUrl", default)]
    pub custom_url: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub thumbnails: Thumbnails,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Thumbnails {
    pub high: Option<Thumbnail>,
    pub medium: Option<Thumbnail>,
    pub default: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Thumbnail {
    pub url: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ChannelStatistics {
    #[serde(rename = "subscriberCount", default, deserialize_with = "count")]
    pub subscriber_count: u64,
    #[serde(rename = "viewCount", default, deserialize_with = "count")]
    pub view_count: u64,
    #[serde(rename = "videoCount", default, deserialize_with = "count")]
    pub video_count: u64,
    #[serde(rename = "hiddenSubscriberCount", default)]
    pub hidden_subscriber_count: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawCount {
    Number(u64),
    Text(String),
}

/// Accepts `"123"`, `123`, or `null`.
fn count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<RawCount>::deserialize(deserializer)? {
        None => Ok(0),
        Some(RawCount::Number(n)) => Ok(n),
        Some(RawCount::Text(s)) => s.trim().parse::<u64>().map_err(serde::de::Error::custom),
    }
}

/// A resolved channel as reported by the detail endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelDetail {
    pub id: String,
    pub title: String,
    pub handle: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    /// Upstream-declared country, uppercased. Often absent.
    pub country: Option<String>,
    pub subscriber_count: u64,
    pub view_count: u64,
    pub video_count: u64,
    pub hidden_subscriber_count: bool,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

impl From<ChannelItem> for ChannelDetail {
    fn from(item: ChannelItem) -> Self {
        let snippet = item.snippet;
        let thumbnails = snippet.thumbnails;
        let image_url = thumbnails
            .high
            .or(thumbnails.medium)
            .or(thumbnails.default)
            .map(|t| t.url);
        Self {
            id: item.id,
            title: snippet.title.trim().to_owned(),
            handle: non_blank(snippet.custom_url),
            description: non_blank(snippet.description),
            image_url,
            country: non_blank(snippet.country).map(|c| c.to_ascii_uppercase()),
            subscriber_count: item.statistics.subscriber_count,
            view_count: item.statistics.view_count,
            video_count: item.statistics.video_count,
            hidden_subscriber_count: item.statistics.hidden_subscriber_count,
        }
    }
}

// ---------------------------------------------------------------------------
// errors
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub errors: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorDetail {
    #[serde(default)]
    pub reason: String,
}
