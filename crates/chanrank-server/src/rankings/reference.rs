//! Built-in reference channels: the last resort of the rankings read path.

use std::collections::HashSet;
use std::sync::{PoisonError, RwLock};

use chanrank_core::{ChannelRecord, PageRequest, RankingFilter, SortKey, StoredChannel};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

const EMBEDDED: &str = include_str!("../../../../config/reference_channels.yaml");

#[derive(Debug, Error)]
pub enum ReferenceError {
    #[error("failed to parse reference channels: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid reference channels: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize)]
struct ReferenceFile {
    captured_at: DateTime<Utc>,
    channels: Vec<ReferenceEntry>,
}

#[derive(Debug, Deserialize)]
struct ReferenceEntry {
    id: String,
    display_name: String,
    #[serde(default)]
    handle: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
    country: String,
    category_id: String,
    subscriber_count: u64,
    total_view_count: u64,
    video_count: u64,
}

impl ReferenceEntry {
    fn into_record(self, captured_at: DateTime<Utc>) -> ChannelRecord {
        ChannelRecord {
            id: self.id,
            display_name: self.display_name,
            handle: self.handle,
            image_url: self.image_url,
            description: None,
            subscriber_count: self.subscriber_count,
            total_view_count: self.total_view_count,
            video_count: self.video_count,
            country: self.country,
            category_id: self.category_id,
            created_at: captured_at,
            last_updated: captured_at,
        }
    }
}

/// Reference channels held in memory. Live collections refresh their
/// statistics in place through [`ReferenceDataset::absorb`].
#[derive(Debug)]
pub struct ReferenceDataset {
    channels: RwLock<Vec<StoredChannel>>,
}

impl ReferenceDataset {
    /// Loads the dataset compiled into the binary.
    ///
    /// # Errors
    ///
    /// Returns [`ReferenceError`] if the embedded file does not parse or
    /// fails validation.
    pub fn embedded() -> Result<Self, ReferenceError> {
        Self::parse(EMBEDDED)
    }

    /// # Errors
    ///
    /// Returns [`ReferenceError::Parse`] for malformed YAML and
    /// [`ReferenceError::Invalid`] for an empty list, blank ids or names,
    /// duplicate ids, or a country that is not a two-letter uppercase code.
    pub fn parse(content: &str) -> Result<Self, ReferenceError> {
        let file: ReferenceFile = serde_yaml::from_str(content)?;
        if file.channels.is_empty() {
            return Err(ReferenceError::Invalid("no channels listed".to_string()));
        }

        let mut seen = HashSet::new();
        for entry in &file.channels {
            if entry.id.trim().is_empty() || entry.display_name.trim().is_empty() {
                return Err(ReferenceError::Invalid(format!(
                    "channel '{}' needs a non-empty id and display_name",
                    entry.id
                )));
            }
            if !seen.insert(entry.id.as_str()) {
                return Err(ReferenceError::Invalid(format!(
                    "duplicate channel id '{}'",
                    entry.id
                )));
            }
            if entry.country.len() != 2 || !entry.country.chars().all(|c| c.is_ascii_uppercase()) {
                return Err(ReferenceError::Invalid(format!(
                    "channel '{}' has invalid country '{}'",
                    entry.id, entry.country
                )));
            }
        }

        let captured_at = file.captured_at;
        let channels = file
            .channels
            .into_iter()
            .map(|entry| StoredChannel::fresh(entry.into_record(captured_at)))
            .collect();
        Ok(Self {
            channels: RwLock::new(channels),
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of the reference channels in `filter`'s partition.
    #[must_use]
    pub fn ids_matching(&self, filter: &RankingFilter) -> Vec<String> {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|c| filter.matches(&c.record))
            .map(|c| c.record.id.clone())
            .collect()
    }

    /// Copies fresh statistics from `records` onto matching reference
    /// channels. Country and category stay as curated. Returns how many
    /// channels were refreshed.
    pub fn absorb(&self, records: &[ChannelRecord]) -> usize {
        let mut channels = self
            .channels
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let mut refreshed = 0;
        for record in records {
            let Some(channel) = channels.iter_mut().find(|c| c.record.id == record.id) else {
                continue;
            };
            if record.last_updated < channel.record.last_updated {
                continue;
            }
            let current = &mut channel.record;
            current.display_name.clone_from(&record.display_name);
            if record.handle.is_some() {
                current.handle.clone_from(&record.handle);
            }
            if record.image_url.is_some() {
                current.image_url.clone_from(&record.image_url);
            }
            current.description.clone_from(&record.description);
            current.subscriber_count = record.subscriber_count;
            current.total_view_count = record.total_view_count;
            current.video_count = record.video_count;
            current.last_updated = record.last_updated;
            refreshed += 1;
        }
        refreshed
    }

    /// One sorted page of the channels matching `filter`, plus the total.
    #[must_use]
    pub fn page(
        &self,
        filter: &RankingFilter,
        sort: SortKey,
        page: PageRequest,
    ) -> (Vec<StoredChannel>, u64) {
        let matching: Vec<StoredChannel> = self
            .channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|c| filter.matches(&c.record))
            .cloned()
            .collect();
        paginate(matching, sort, page)
    }
}

/// Sorts `channels` by `sort` and cuts out `page`.
pub(super) fn paginate(
    mut channels: Vec<StoredChannel>,
    sort: SortKey,
    page: PageRequest,
) -> (Vec<StoredChannel>, u64) {
    channels.sort_by(|a, b| sort.compare(a, b));
    let total = channels.len() as u64;
    let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
    let items = channels
        .into_iter()
        .skip(offset)
        .take(page.page_size as usize)
        .collect();
    (items, total)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
captured_at: 2026-09-01T00:00:00Z
channels:
  - id: UCa
    display_name: Alpha
    country: KR
    category_id: music
    subscriber_count: 300
    total_view_count: 9000
    video_count: 10
  - id: UCb
    display_name: Beta
    handle: "@beta"
    country: KR
    category_id: gaming
    subscriber_count: 500
    total_view_count: 1000
    video_count: 10
  - id: UCc
    display_name: Gamma
    country: US
    category_id: music
    subscriber_count: 400
    total_view_count: 2000
    video_count: 10
"#;

    fn filter(country: Option<&str>, category: Option<&str>) -> RankingFilter {
        RankingFilter {
            country: country.map(str::to_string),
            category: category.map(str::to_string),
        }
    }

    #[test]
    fn embedded_dataset_is_valid() {
        let dataset = ReferenceDataset::embedded().expect("embedded reference data should load");
        assert!(!dataset.is_empty());
    }

    #[test]
    fn rejects_empty_and_malformed_datasets() {
        let empty = "captured_at: 2026-09-01T00:00:00Z\nchannels: []\n";
        assert!(matches!(
            ReferenceDataset::parse(empty),
            Err(ReferenceError::Invalid(_))
        ));

        let bad_country = SAMPLE.replace("country: US", "country: usa");
        assert!(matches!(
            ReferenceDataset::parse(&bad_country),
            Err(ReferenceError::Invalid(_))
        ));

        let blank_name = SAMPLE.replace("display_name: Beta", "display_name: ' '");
        assert!(ReferenceDataset::parse(&blank_name).is_err());

        assert!(matches!(
            ReferenceDataset::parse("channels: {"),
            Err(ReferenceError::Parse(_))
        ));
    }

    #[test]
    fn page_filters_sorts_and_paginates() {
        let dataset = ReferenceDataset::parse(SAMPLE).unwrap();
        let first = PageRequest {
            page: 1,
            page_size: 2,
        };

        let (items, total) = dataset.page(&filter(None, None), SortKey::Subscribers, first);
        assert_eq!(total, 3);
        let ids: Vec<&str> = items.iter().map(|c| c.record.id.as_str()).collect();
        assert_eq!(ids, vec!["UCb", "UCc"]);

        let second = PageRequest {
            page: 2,
            page_size: 2,
        };
        let (items, _) = dataset.page(&filter(None, None), SortKey::Subscribers, second);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].record.id, "UCa");

        let (items, total) = dataset.page(&filter(Some("KR"), None), SortKey::Views, first);
        assert_eq!(total, 2);
        assert_eq!(items[0].record.id, "UCa");
    }

    #[test]
    fn absorb_refreshes_statistics_but_keeps_curated_partition() {
        let dataset = ReferenceDataset::parse(SAMPLE).unwrap();
        let (items, _) = dataset.page(
            &filter(None, Some("gaming")),
            SortKey::Subscribers,
            PageRequest {
                page: 1,
                page_size: 10,
            },
        );
        let mut record = items[0].record.clone();
        record.subscriber_count = 9_999;
        record.country = "JP".to_string();
        record.handle = None;
        record.last_updated = Utc::now();

        assert_eq!(dataset.absorb(&[record]), 1);

        let (items, _) = dataset.page(
            &filter(Some("KR"), Some("gaming")),
            SortKey::Subscribers,
            PageRequest {
                page: 1,
                page_size: 10,
            },
        );
        assert_eq!(items[0].record.subscriber_count, 9_999);
        assert_eq!(items[0].record.handle.as_deref(), Some("@beta"));
    }

    #[test]
    fn absorb_ignores_unknown_ids() {
        let dataset = ReferenceDataset::parse(SAMPLE).unwrap();
        let (items, _) = dataset.page(
            &filter(None, None),
            SortKey::Subscribers,
            PageRequest {
                page: 1,
                page_size: 1,
            },
        );
        let mut stranger = items[0].record.clone();
        stranger.id = "UCzzz".to_string();
        assert_eq!(dataset.absorb(&[stranger]), 0);
        assert_eq!(dataset.len(), 3);
    }

    #[test]
    fn ids_matching_respects_filter() {
        let dataset = ReferenceDataset::parse(SAMPLE).unwrap();
        let mut ids = dataset.ids_matching(&filter(None, Some("music")));
        ids.sort();
        assert_eq!(ids, vec!["UCa", "UCc"]);
    }
}
