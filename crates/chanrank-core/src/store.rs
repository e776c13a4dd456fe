//! Persistence contract for ranked channels.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::channels::{ChannelRecord, PageRequest, RankingFilter, SortKey, StoredChannel};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("ranking store unavailable: {0}")]
    Unavailable(String),
}

/// Result of an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    /// The stored row already carried a newer `last_updated`; nothing was written.
    SkippedStale,
}

impl UpsertOutcome {
    #[must_use]
    pub fn created(self) -> bool {
        matches!(self, UpsertOutcome::Created)
    }
}

/// Durable, queryable channel storage keyed by the upstream channel id.
///
/// Implementations must never write a record whose `last_updated` is older
/// than the stored one, and must order query results descending on the sort
/// key with ties broken by ascending id.
#[async_trait]
pub trait RankingStore: Send + Sync {
    async fn upsert(&self, record: &ChannelRecord) -> Result<UpsertOutcome, StoreError>;

    async fn count(&self, filter: &RankingFilter) -> Result<u64, StoreError>;

    /// Returns one page of channels plus the total matching the filter.
    async fn query(
        &self,
        filter: &RankingFilter,
        sort: SortKey,
        page: PageRequest,
    ) -> Result<(Vec<StoredChannel>, u64), StoreError>;

    /// Subset of `ids` whose stored `last_updated` is at or after `since`.
    async fn fresh_ids(
        &self,
        ids: &[String],
        since: DateTime<Utc>,
    ) -> Result<HashSet<String>, StoreError>;
}
