//! Batch detail resolution: candidate ids in, full channel details out.

use std::collections::BTreeSet;

use chanrank_upstream::{ChannelDetail, Fetcher, UpstreamError, MAX_DETAIL_BATCH};
use chrono::{DateTime, Utc};

/// A channel detail stamped with the time its chunk came back.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedChannel {
    pub detail: ChannelDetail,
    pub resolved_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct ResolveOutcome {
    pub records: Vec<ResolvedChannel>,
    pub chunks_total: usize,
    pub chunks_failed: usize,
    /// Remaining chunks were abandoned because every key is exhausted.
    pub keys_exhausted: bool,
}

pub struct BatchResolver<'a> {
    fetcher: &'a Fetcher,
    batch_size: usize,
    detail_cost: u64,
}

impl<'a> BatchResolver<'a> {
    /// `batch_size` is clamped to `1..=50`.
    #[must_use]
    pub fn new(fetcher: &'a Fetcher, batch_size: usize, detail_cost: u64) -> Self {
        Self {
            fetcher,
            batch_size: batch_size.clamp(1, MAX_DETAIL_BATCH),
            detail_cost,
        }
    }

    /// Resolves `ids` in sorted, de-duplicated chunks, one detail call each.
    ///
    /// A failed chunk is logged and skipped; chunks already resolved are
    /// kept. Ids the upstream does not return are dropped silently.
    pub async fn resolve<I>(&self, ids: I) -> ResolveOutcome
    where
        I: IntoIterator<Item = String>,
    {
        let ids: Vec<String> = ids
            .into_iter()
            .filter(|id| !id.trim().is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut outcome = ResolveOutcome {
            chunks_total: ids.len().div_ceil(self.batch_size),
            ..ResolveOutcome::default()
        };

        for (index, chunk) in ids.chunks(self.batch_size).enumerate() {
            match self.fetcher.channel_details(chunk, self.detail_cost).await {
                Ok(details) => {
                    let resolved_at = Utc::now();
                    if details.len() < chunk.len() {
                        tracing::debug!(
                            chunk = index,
                            requested = chunk.len(),
                            returned = details.len(),
                            "upstream omitted some channels"
                        );
                    }
                    outcome
                        .records
                        .extend(details.into_iter().map(|detail| ResolvedChannel {
                            detail,
                            resolved_at,
                        }));
                }
                Err(UpstreamError::AllKeysExhausted) => {
                    let abandoned = outcome.chunks_total - index;
                    tracing::warn!(
                        abandoned_chunks = abandoned,
                        resolved = outcome.records.len(),
                        "all keys exhausted; stopping detail resolution"
                    );
                    outcome.chunks_failed += abandoned;
                    outcome.keys_exhausted = true;
                    break;
                }
                Err(e) => {
                    tracing::warn!(
                        chunk = index,
                        size = chunk.len(),
                        error = %e,
                        "detail chunk failed; skipping"
                    );
                    outcome.chunks_failed += 1;
                }
            }
        }

        outcome
    }
}
