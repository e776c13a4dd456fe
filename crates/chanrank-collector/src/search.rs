//! Search collection: run query templates until enough candidates are found.

use std::collections::HashSet;

use chanrank_upstream::{Fetcher, SearchOrder, SearchRequest, UpstreamError, MAX_SEARCH_RESULTS};

#[derive(Debug, Clone)]
pub struct SearchSettings {
    /// Multiplier on the target count; filtering later drops a share of
    /// candidates.
    pub overcollect_factor: f64,
    pub pages_per_query: u32,
    pub max_results: u32,
    pub order: SearchOrder,
    pub search_cost: u64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            overcollect_factor: 1.5,
            pages_per_query: 1,
            max_results: MAX_SEARCH_RESULTS,
            order: SearchOrder::ViewCount,
            search_cost: 100,
        }
    }
}

#[derive(Debug, Default)]
pub struct CollectOutcome {
    pub candidates: HashSet<String>,
    /// The run hit `AllKeysExhausted`; `candidates` is partial.
    pub keys_exhausted: bool,
    pub queries_issued: usize,
    pub queries_failed: usize,
}

/// `ceil(target × factor)`, never below `target`.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn overcollect_target(target: usize, factor: f64) -> usize {
    let scaled = (target as f64 * factor.max(1.0)).ceil();
    (scaled as usize).max(target)
}

pub struct SearchCollector<'a> {
    fetcher: &'a Fetcher,
    settings: &'a SearchSettings,
}

impl<'a> SearchCollector<'a> {
    #[must_use]
    pub fn new(fetcher: &'a Fetcher, settings: &'a SearchSettings) -> Self {
        Self { fetcher, settings }
    }

    /// Runs `templates` in order for one (region, category) pass and returns
    /// the de-duplicated candidate ids.
    ///
    /// Stops early once the over-collect target is reached or every key is
    /// exhausted. A failing template is logged and skipped; the partial set
    /// is always returned.
    pub async fn collect(
        &self,
        region: &str,
        category: &str,
        templates: &[String],
        target_count: usize,
    ) -> CollectOutcome {
        let goal = overcollect_target(target_count, self.settings.overcollect_factor);
        let mut outcome = CollectOutcome::default();

        'templates: for template in templates {
            if outcome.candidates.len() >= goal {
                break;
            }

            let mut page_token: Option<String> = None;
            for _ in 0..self.settings.pages_per_query.max(1) {
                let request = SearchRequest {
                    query: template,
                    region: Some(region),
                    order: self.settings.order,
                    max_results: self.settings.max_results,
                    page_token: page_token.as_deref(),
                };

                let result = self
                    .fetcher
                    .search_channels(&request, self.settings.search_cost)
                    .await;
                match result {
                    Ok(page) => {
                        outcome.queries_issued += 1;
                        let before = outcome.candidates.len();
                        outcome.candidates.extend(page.channel_ids);
                        tracing::debug!(
                            region,
                            category,
                            query = %template,
                            new_candidates = outcome.candidates.len() - before,
                            total = outcome.candidates.len(),
                            "search page collected"
                        );
                        page_token = page.next_page_token;
                    }
                    Err(UpstreamError::AllKeysExhausted) => {
                        outcome.keys_exhausted = true;
                        tracing::warn!(
                            region,
                            category,
                            candidates = outcome.candidates.len(),
                            "all keys exhausted; ending search collection"
                        );
                        break 'templates;
                    }
                    Err(e) => {
                        outcome.queries_issued += 1;
                        outcome.queries_failed += 1;
                        tracing::warn!(
                            region,
                            category,
                            query = %template,
                            error = %e,
                            "search query failed; skipping template"
                        );
                        continue 'templates;
                    }
                }

                if page_token.is_none() || outcome.candidates.len() >= goal {
                    break;
                }
            }
        }

        outcome
    }
}
