//! One configurable collection pipeline for every (region, category) pass:
//! search → skip fresh → resolve → de-duplicate → filter → upsert.

use std::sync::Arc;
use std::time::Duration;

use chanrank_core::{
    AppConfig, ChannelRecord, CollectionPlan, RankingFilter, RankingStore, UpsertOutcome,
};
use chanrank_upstream::{Fetcher, FetcherOptions, KeyPool};
use chrono::{TimeDelta, Utc};
use futures::stream::{self, StreamExt};

use crate::error::CollectorError;
use crate::filter::{dedupe_latest, QualityFilter};
use crate::resolve::BatchResolver;
use crate::search::{SearchCollector, SearchSettings};

#[derive(Debug, Clone)]
pub struct CollectSettings {
    pub search: SearchSettings,
    pub batch_size: usize,
    pub detail_cost: u64,
    pub max_concurrent_passes: usize,
    /// Candidates refreshed within this window are not resolved again.
    /// `None` resolves everything.
    pub refresh_after: Option<TimeDelta>,
    /// Resolve and filter, but write nothing.
    pub dry_run: bool,
}

impl Default for CollectSettings {
    fn default() -> Self {
        Self {
            search: SearchSettings::default(),
            batch_size: 50,
            detail_cost: 1,
            max_concurrent_passes: 1,
            refresh_after: None,
            dry_run: false,
        }
    }
}

impl CollectSettings {
    #[must_use]
    pub fn from_config(config: &AppConfig, plan: &CollectionPlan) -> Self {
        let refresh_after = match config.collect_refresh_after_hours {
            0 => None,
            hours => TimeDelta::try_hours(i64::try_from(hours).unwrap_or(i64::MAX)),
        };
        Self {
            search: SearchSettings {
                overcollect_factor: plan.defaults.overcollect_factor,
                pages_per_query: plan.defaults.pages_per_query,
                search_cost: config.upstream_search_cost,
                ..SearchSettings::default()
            },
            batch_size: config.upstream_batch_size,
            detail_cost: config.upstream_detail_cost,
            max_concurrent_passes: config.collect_max_concurrent_passes,
            refresh_after,
            dry_run: false,
        }
    }
}

/// Counters for one (region, category) pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub region: String,
    pub category: String,
    /// The pass never ran: no templates, or no usable key left.
    pub skipped: bool,
    pub keys_exhausted: bool,
    pub queries_issued: usize,
    pub queries_failed: usize,
    pub candidates: usize,
    pub skipped_fresh: usize,
    pub chunks_failed: usize,
    pub resolved: usize,
    pub rejected: usize,
    pub accepted: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped_stale: usize,
    pub store_errors: usize,
}

impl PassSummary {
    fn new(region: &str, category: &str) -> Self {
        Self {
            region: region.to_owned(),
            category: category.to_owned(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn records_written(&self) -> usize {
        self.created + self.updated
    }

    fn had_errors(&self) -> bool {
        self.keys_exhausted
            || self.queries_failed > 0
            || self.chunks_failed > 0
            || self.store_errors > 0
    }

    /// Ran, hit errors, and produced nothing usable.
    #[must_use]
    pub fn failed(&self) -> bool {
        !self.skipped
            && self.had_errors()
            && (self.accepted == 0 || self.store_errors == self.accepted)
    }

    #[must_use]
    pub fn status(&self) -> &'static str {
        if self.skipped {
            "skipped"
        } else if self.failed() {
            "failed"
        } else if self.had_errors() {
            "partial"
        } else {
            "succeeded"
        }
    }

    /// Human-readable account of what went wrong, if anything.
    #[must_use]
    pub fn note(&self) -> Option<String> {
        let mut parts = Vec::new();
        if self.keys_exhausted {
            parts.push("all upstream API keys exhausted".to_owned());
        }
        if self.queries_failed > 0 {
            parts.push(format!("{} search queries failed", self.queries_failed));
        }
        if self.chunks_failed > 0 {
            parts.push(format!("{} detail chunks failed", self.chunks_failed));
        }
        if self.store_errors > 0 {
            parts.push(format!("{} store writes failed", self.store_errors));
        }
        (!parts.is_empty()).then(|| parts.join("; "))
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub passes: Vec<PassSummary>,
}

impl RunSummary {
    #[must_use]
    pub fn records_written(&self) -> usize {
        self.passes.iter().map(PassSummary::records_written).sum()
    }

    #[must_use]
    pub fn accepted(&self) -> usize {
        self.passes.iter().map(|p| p.accepted).sum()
    }

    #[must_use]
    pub fn keys_exhausted(&self) -> bool {
        self.passes.iter().any(|p| p.keys_exhausted)
    }

    #[must_use]
    pub fn failed_passes(&self) -> usize {
        self.passes.iter().filter(|p| p.failed()).count()
    }

    /// Nothing was written and every pass that ran failed.
    #[must_use]
    pub fn all_failed(&self) -> bool {
        let ran = self.passes.iter().filter(|p| !p.skipped).count();
        ran > 0 && self.failed_passes() == ran && self.records_written() == 0
    }
}

/// Records produced by a read-path collection. Nothing is persisted.
#[derive(Debug, Default)]
pub struct TransientOutcome {
    pub records: Vec<ChannelRecord>,
    pub keys_exhausted: bool,
}

pub struct Pipeline {
    fetcher: Fetcher,
    plan: Arc<CollectionPlan>,
    store: Arc<dyn RankingStore>,
    settings: CollectSettings,
}

impl Pipeline {
    #[must_use]
    pub fn new(
        fetcher: Fetcher,
        plan: Arc<CollectionPlan>,
        store: Arc<dyn RankingStore>,
        settings: CollectSettings,
    ) -> Self {
        Self {
            fetcher,
            plan,
            store,
            settings,
        }
    }

    /// Builds the key pool and fetcher from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError::Upstream`] if the upstream base URL is
    /// invalid or the HTTP client cannot be built.
    pub fn from_app_config(
        config: &AppConfig,
        plan: Arc<CollectionPlan>,
        store: Arc<dyn RankingStore>,
    ) -> Result<Self, CollectorError> {
        let pool = Arc::new(KeyPool::new(
            &config.upstream_api_keys,
            config.upstream_daily_unit_ceiling,
        ));
        if pool.is_empty() {
            tracing::warn!("no upstream API keys configured; collection will find nothing");
        }
        let options = FetcherOptions {
            timeout_secs: config.upstream_timeout_secs,
            min_interval: Duration::from_millis(config.upstream_min_interval_ms),
            ..FetcherOptions::default()
        };
        let fetcher = Fetcher::with_base_url(pool, &options, &config.upstream_base_url)?;
        let settings = CollectSettings::from_config(config, &plan);
        Ok(Self::new(fetcher, plan, store, settings))
    }

    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.settings.dry_run = dry_run;
        self
    }

    /// Disables the skip-recently-refreshed check for this pipeline.
    #[must_use]
    pub fn with_force_refresh(mut self, force: bool) -> Self {
        if force {
            self.settings.refresh_after = None;
        }
        self
    }

    #[must_use]
    pub fn plan(&self) -> &CollectionPlan {
        &self.plan
    }

    #[must_use]
    pub fn key_pool(&self) -> &Arc<KeyPool> {
        self.fetcher.pool()
    }

    #[must_use]
    pub fn settings(&self) -> &CollectSettings {
        &self.settings
    }

    /// Planned passes, optionally narrowed to one region and/or category.
    #[must_use]
    pub fn passes(&self, region: Option<&str>, category: Option<&str>) -> Vec<(String, String)> {
        self.plan
            .passes()
            .into_iter()
            .filter(|(r, c)| {
                region.is_none_or(|want| r.eq_ignore_ascii_case(want))
                    && category.is_none_or(|want| c == want)
            })
            .collect()
    }

    /// Runs one (region, category) pass to completion. Never fails: every
    /// problem is counted in the returned summary.
    pub async fn run_pass(&self, region: &str, category: &str) -> PassSummary {
        let mut summary = PassSummary::new(region, category);
        let fetcher = self.fetcher.for_caller();

        let templates = self.plan.queries_for(region, category);
        if templates.is_empty() {
            summary.skipped = true;
            return summary;
        }
        if !fetcher.pool().has_available() {
            tracing::info!(region, category, "skipping pass; no upstream key available");
            summary.skipped = true;
            summary.keys_exhausted = true;
            return summary;
        }

        let collected = SearchCollector::new(&fetcher, &self.settings.search)
            .collect(
                region,
                category,
                templates,
                self.plan.target_count_for(region),
            )
            .await;
        summary.queries_issued = collected.queries_issued;
        summary.queries_failed = collected.queries_failed;
        summary.candidates = collected.candidates.len();
        summary.keys_exhausted = collected.keys_exhausted;

        let mut candidates: Vec<String> = collected.candidates.into_iter().collect();
        if let Some(window) = self.settings.refresh_after {
            match self.store.fresh_ids(&candidates, Utc::now() - window).await {
                Ok(fresh) => {
                    candidates.retain(|id| !fresh.contains(id));
                    summary.skipped_fresh = fresh.len();
                }
                Err(e) => {
                    tracing::warn!(
                        region,
                        category,
                        error = %e,
                        "could not check candidate freshness; resolving all"
                    );
                }
            }
        }

        let resolver = BatchResolver::new(
            &fetcher,
            self.settings.batch_size,
            self.settings.detail_cost,
        );
        let resolved = resolver.resolve(candidates).await;
        summary.chunks_failed = resolved.chunks_failed;
        summary.keys_exhausted |= resolved.keys_exhausted;

        let records = dedupe_latest(resolved.records);
        summary.resolved = records.len();

        let quality = QualityFilter::new(&self.plan);
        for channel in &records {
            if let Some(rejection) = quality.check(&channel.detail, region) {
                summary.rejected += 1;
                tracing::debug!(
                    region,
                    channel_id = %channel.detail.id,
                    reason = %rejection,
                    "channel rejected"
                );
                continue;
            }
            summary.accepted += 1;
            if self.settings.dry_run {
                continue;
            }

            let record = quality.to_record(channel, region, Some(category));
            match self.store.upsert(&record).await {
                Ok(UpsertOutcome::Created) => summary.created += 1,
                Ok(UpsertOutcome::Updated) => summary.updated += 1,
                Ok(UpsertOutcome::SkippedStale) => summary.skipped_stale += 1,
                Err(e) => {
                    summary.store_errors += 1;
                    tracing::warn!(
                        region,
                        channel_id = %record.id,
                        error = %e,
                        "failed to store channel"
                    );
                }
            }
        }

        tracing::info!(
            region,
            category,
            status = summary.status(),
            queries = summary.queries_issued,
            candidates = summary.candidates,
            skipped_fresh = summary.skipped_fresh,
            resolved = summary.resolved,
            accepted = summary.accepted,
            created = summary.created,
            updated = summary.updated,
            "collection pass finished"
        );
        summary
    }

    /// Runs `passes`, up to `max_concurrent_passes` at a time, all drawing on
    /// the same key pool. Summaries come back sorted by region then category.
    pub async fn run(&self, passes: &[(String, String)]) -> RunSummary {
        let max_concurrent = self.settings.max_concurrent_passes.max(1);
        let pass_futures: Vec<_> = passes
            .iter()
            .map(|(region, category)| self.run_pass(region, category))
            .collect();
        let mut summaries: Vec<PassSummary> = stream::iter(pass_futures)
            .buffer_unordered(max_concurrent)
            .collect()
            .await;
        summaries.sort_by(|a, b| (&a.region, &a.category).cmp(&(&b.region, &b.category)));

        let summary = RunSummary { passes: summaries };
        if summary.keys_exhausted() {
            tracing::warn!(
                records = summary.records_written(),
                "collection run ended early: upstream quota exhausted"
            );
        }
        summary
    }

    /// Template list for a read-path collection: the first
    /// `fallback_query_limit` templates of the region (or the baseline
    /// region when the region has none), restricted to `category` if given.
    fn fallback_templates(&self, region: &str, category: Option<&str>) -> Vec<String> {
        let limit = self.plan.defaults.fallback_query_limit;
        let for_region = |code: &str| -> Vec<String> {
            match category {
                Some(c) => self.plan.queries_for(code, c).to_vec(),
                None => self
                    .plan
                    .region(code)
                    .map(|r| r.queries.values().flatten().cloned().collect())
                    .unwrap_or_default(),
            }
        };
        let mut templates = for_region(region);
        if templates.is_empty() {
            templates = for_region(&self.plan.baseline_region);
        }
        templates.truncate(limit);
        templates
    }

    /// Reduced collection for the read path: a few templates, no
    /// over-collection, no persistence. `extra_ids` are resolved alongside
    /// the search results. Only records matching `filter` are returned.
    pub async fn collect_transient(
        &self,
        filter: &RankingFilter,
        target: usize,
        extra_ids: &[String],
    ) -> TransientOutcome {
        let filter = filter.normalized();
        let region = filter
            .country
            .clone()
            .unwrap_or_else(|| self.plan.baseline_region.clone());
        let category = filter.category.as_deref();
        let fetcher = self.fetcher.for_caller();

        let settings = SearchSettings {
            overcollect_factor: 1.0,
            pages_per_query: 1,
            ..self.settings.search.clone()
        };
        let templates = self.fallback_templates(&region, category);
        let collected = SearchCollector::new(&fetcher, &settings)
            .collect(&region, category.unwrap_or("any"), &templates, target)
            .await;

        let ids = collected
            .candidates
            .into_iter()
            .chain(extra_ids.iter().cloned());
        let resolver = BatchResolver::new(
            &fetcher,
            self.settings.batch_size,
            self.settings.detail_cost,
        );
        let resolved = resolver.resolve(ids).await;

        let quality = QualityFilter::new(&self.plan);
        let records: Vec<ChannelRecord> = dedupe_latest(resolved.records)
            .iter()
            .filter(|r| quality.accept(&r.detail, &region))
            .map(|r| quality.to_record(r, &region, category))
            .filter(|r| filter.matches(r))
            .collect();

        tracing::info!(
            region = %region,
            category = category.unwrap_or("any"),
            templates = templates.len(),
            records = records.len(),
            "transient collection finished"
        );
        TransientOutcome {
            records,
            keys_exhausted: collected.keys_exhausted || resolved.keys_exhausted,
        }
    }
}
