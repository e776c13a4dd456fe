//! Ranking query service.
//!
//! Each request walks cache → store → live fallback collection → built-in
//! reference data, stopping at the first source that answers. Rank is
//! assigned here from the page offset; it is never stored.

mod cache;
mod reference;

use std::sync::Arc;
use std::time::Duration;

use chanrank_collector::Pipeline;
use chanrank_core::{AppConfig, PageRequest, RankingFilter, RankingStore, SortKey, StoredChannel};
use serde::Serialize;
use thiserror::Error;

pub use cache::TtlCache;
pub use reference::{ReferenceDataset, ReferenceError};

/// Upper bound on a live fallback collection, on top of the per-call
/// upstream timeout.
const FALLBACK_DEADLINE: Duration = Duration::from_secs(30);

/// Most channels a live fallback collects for one request.
const FALLBACK_MAX_TARGET: u64 = 500;

#[derive(Debug, Error)]
pub enum RankingError {
    #[error("reference dataset unavailable: {0}")]
    ReferenceUnavailable(String),
}

/// Page-size bounds applied to every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub min: u32,
    pub max: u32,
    pub default: u32,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            min: 10,
            max: 100,
            default: 50,
        }
    }
}

impl PageLimits {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            min: config.page_size_min,
            max: config.page_size_max,
            default: config.page_size_default,
        }
    }

    #[must_use]
    pub fn clamp(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.default)
            .clamp(self.min, self.max.max(self.min))
    }
}

/// A normalized rankings request; doubles as the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RankingRequest {
    pub filter: RankingFilter,
    pub sort: SortKey,
    pub page: PageRequest,
}

impl RankingRequest {
    #[must_use]
    pub fn new(
        filter: &RankingFilter,
        sort: SortKey,
        page: Option<u32>,
        page_size: Option<u32>,
        limits: &PageLimits,
    ) -> Self {
        Self {
            filter: filter.normalized(),
            sort,
            page: PageRequest {
                page: page.unwrap_or(1).max(1),
                page_size: limits.clamp(page_size),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingSource {
    Store,
    LiveFallback,
    Reference,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedChannel {
    pub current_rank: u64,
    #[serde(flatten)]
    pub channel: StoredChannel,
    pub engagement_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankingPage {
    pub items: Vec<RankedChannel>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub sort: SortKey,
    pub country: Option<String>,
    pub category: Option<String>,
    pub source: RankingSource,
}

impl RankingPage {
    fn build(
        request: &RankingRequest,
        channels: Vec<StoredChannel>,
        total: u64,
        source: RankingSource,
    ) -> Self {
        let offset = request.page.offset();
        let items = channels
            .into_iter()
            .zip(1u64..)
            .map(|(channel, position)| RankedChannel {
                current_rank: offset + position,
                engagement_rate: channel.engagement_rate(),
                channel,
            })
            .collect();
        Self {
            items,
            total,
            page: request.page.page,
            page_size: request.page.page_size,
            sort: request.sort,
            country: request.filter.country.clone(),
            category: request.filter.category.clone(),
            source,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub cache_ttl: Duration,
    pub cache_max_entries: usize,
    pub page_limits: PageLimits,
}

impl ServiceSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            cache_ttl: Duration::from_secs(config.cache_ttl_secs),
            cache_max_entries: config.cache_max_entries,
            page_limits: PageLimits::from_app_config(config),
        }
    }
}

pub struct RankingService {
    store: Arc<dyn RankingStore>,
    pipeline: Option<Arc<Pipeline>>,
    reference: Result<ReferenceDataset, String>,
    cache: TtlCache<RankingRequest, RankingPage>,
    page_limits: PageLimits,
}

impl RankingService {
    /// `pipeline` drives the live fallback; without it a store failure goes
    /// straight to the reference data. An invalid `reference` is logged
    /// once here and reported on every request that needs it.
    #[must_use]
    pub fn new(
        store: Arc<dyn RankingStore>,
        pipeline: Option<Arc<Pipeline>>,
        reference: Result<ReferenceDataset, ReferenceError>,
        settings: &ServiceSettings,
    ) -> Self {
        let reference = reference.map_err(|e| {
            tracing::error!(error = %e, "reference dataset failed validation");
            e.to_string()
        });
        Self {
            store,
            pipeline,
            reference,
            cache: TtlCache::new(settings.cache_ttl, settings.cache_max_entries),
            page_limits: settings.page_limits,
        }
    }

    #[must_use]
    pub fn page_limits(&self) -> &PageLimits {
        &self.page_limits
    }

    /// Serves one page of rankings.
    ///
    /// # Errors
    ///
    /// Returns [`RankingError::ReferenceUnavailable`] only when the store and
    /// the live fallback both failed and the reference dataset is invalid.
    pub async fn get_rankings(
        &self,
        request: &RankingRequest,
    ) -> Result<RankingPage, RankingError> {
        if let Some(page) = self.cache.get(request) {
            tracing::debug!(sort = %request.sort, page = request.page.page, "rankings cache hit");
            return Ok(page);
        }

        match self
            .store
            .query(&request.filter, request.sort, request.page)
            .await
        {
            Ok((channels, total)) => {
                let page = RankingPage::build(request, channels, total, RankingSource::Store);
                self.cache.insert(request.clone(), page.clone());
                tracing::debug!(cached_pages = self.cache.len(), "rankings served from store");
                return Ok(page);
            }
            Err(e) => {
                tracing::warn!(error = %e, "ranking store query failed; trying live fallback");
            }
        }

        if let Some(page) = self.live_fallback(request).await {
            self.cache.insert(request.clone(), page.clone());
            return Ok(page);
        }

        self.reference_page(request)
    }

    async fn live_fallback(&self, request: &RankingRequest) -> Option<RankingPage> {
        let pipeline = self.pipeline.as_ref()?;
        let reference_ids = self
            .reference
            .as_ref()
            .map(|r| r.ids_matching(&request.filter))
            .unwrap_or_default();

        let end = request.page.offset() + u64::from(request.page.page_size);
        let target = usize::try_from(end.min(FALLBACK_MAX_TARGET)).unwrap_or(usize::MAX);
        let collect = pipeline.collect_transient(&request.filter, target, &reference_ids);
        let outcome = match tokio::time::timeout(FALLBACK_DEADLINE, collect).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(
                    deadline_secs = FALLBACK_DEADLINE.as_secs(),
                    "live fallback collection timed out"
                );
                return None;
            }
        };

        if let Ok(reference) = &self.reference {
            let refreshed = reference.absorb(&outcome.records);
            if refreshed > 0 {
                tracing::debug!(refreshed, "reference channels refreshed from live data");
            }
        }

        if outcome.records.is_empty() {
            tracing::warn!(
                keys_exhausted = outcome.keys_exhausted,
                "live fallback collection found nothing"
            );
            return None;
        }

        let channels = outcome
            .records
            .into_iter()
            .map(StoredChannel::fresh)
            .collect();
        let (items, total) = reference::paginate(channels, request.sort, request.page);
        if request.page.offset() >= total {
            tracing::debug!(
                page = request.page.page,
                collected = total,
                "live fallback collection ends before the requested page"
            );
            return None;
        }
        Some(RankingPage::build(
            request,
            items,
            total,
            RankingSource::LiveFallback,
        ))
    }

    fn reference_page(&self, request: &RankingRequest) -> Result<RankingPage, RankingError> {
        let reference = self
            .reference
            .as_ref()
            .map_err(|reason| RankingError::ReferenceUnavailable(reason.clone()))?;
        let (items, total) = reference.page(&request.filter, request.sort, request.page);
        tracing::warn!(total, "serving built-in reference rankings");
        Ok(RankingPage::build(
            request,
            items,
            total,
            RankingSource::Reference,
        ))
    }
}

#[cfg(test)]
#[path = "service_test.rs"]
mod tests;
