//! In-process [`RankingStore`] with the same upsert, baseline and ordering
//! rules as the Postgres store.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chanrank_core::{
    ChannelRecord, PageRequest, RankingFilter, RankingStore, SortKey, StoreError, StoredChannel,
    UpsertOutcome,
};
use chrono::{DateTime, Duration, Utc};

use crate::channels::BASELINE_WINDOW_DAYS;

#[derive(Debug, Clone)]
struct Entry {
    record: ChannelRecord,
    baseline_subscribers: u64,
    baseline_views: u64,
    baseline_at: DateTime<Utc>,
}

impl Entry {
    fn to_stored(&self) -> StoredChannel {
        StoredChannel {
            record: self.record.clone(),
            weekly_subscriber_change: delta(
                self.record.subscriber_count,
                self.baseline_subscribers,
            ),
            weekly_view_change: delta(self.record.total_view_count, self.baseline_views),
        }
    }
}

fn delta(current: u64, baseline: u64) -> i64 {
    let current = i64::try_from(current).unwrap_or(i64::MAX);
    let baseline = i64::try_from(baseline).unwrap_or(i64::MAX);
    current.saturating_sub(baseline)
}

#[derive(Debug, Default)]
pub struct MemoryRankingStore {
    entries: Mutex<HashMap<String, Entry>>,
    unavailable: AtomicBool,
}

impl MemoryRankingStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every operation fails with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<StoredChannel> {
        self.lock().get(id).map(Entry::to_stored)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "in-memory store marked unavailable".to_owned(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl RankingStore for MemoryRankingStore {
    async fn upsert(&self, record: &ChannelRecord) -> Result<UpsertOutcome, StoreError> {
        self.check_available()?;
        let mut entries = self.lock();
        let Some(existing) = entries.get_mut(&record.id) else {
            entries.insert(
                record.id.clone(),
                Entry {
                    record: record.clone(),
                    baseline_subscribers: record.subscriber_count,
                    baseline_views: record.total_view_count,
                    baseline_at: record.last_updated,
                },
            );
            return Ok(UpsertOutcome::Created);
        };

        if existing.record.last_updated > record.last_updated {
            return Ok(UpsertOutcome::SkippedStale);
        }

        if record.last_updated - existing.baseline_at >= Duration::days(BASELINE_WINDOW_DAYS) {
            existing.baseline_subscribers = existing.record.subscriber_count;
            existing.baseline_views = existing.record.total_view_count;
            existing.baseline_at = existing.record.last_updated;
        }
        let created_at = existing.record.created_at;
        existing.record = ChannelRecord {
            created_at,
            ..record.clone()
        };
        Ok(UpsertOutcome::Updated)
    }

    async fn count(&self, filter: &RankingFilter) -> Result<u64, StoreError> {
        self.check_available()?;
        let filter = filter.normalized();
        let count = self
            .lock()
            .values()
            .filter(|e| filter.matches(&e.record))
            .count();
        Ok(count as u64)
    }

    async fn query(
        &self,
        filter: &RankingFilter,
        sort: SortKey,
        page: PageRequest,
    ) -> Result<(Vec<StoredChannel>, u64), StoreError> {
        self.check_available()?;
        let filter = filter.normalized();
        let mut matching: Vec<StoredChannel> = self
            .lock()
            .values()
            .filter(|e| filter.matches(&e.record))
            .map(Entry::to_stored)
            .collect();
        matching.sort_by(|a, b| sort.compare(a, b));

        let total = matching.len() as u64;
        let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
        let items = matching
            .into_iter()
            .skip(offset)
            .take(page.page_size as usize)
            .collect();
        Ok((items, total))
    }

    async fn fresh_ids(
        &self,
        ids: &[String],
        since: DateTime<Utc>,
    ) -> Result<HashSet<String>, StoreError> {
        self.check_available()?;
        let entries = self.lock();
        Ok(ids
            .iter()
            .filter(|id| {
                entries
                    .get(id.as_str())
                    .is_some_and(|e| e.record.last_updated >= since)
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, subs: u64, views: u64, at: DateTime<Utc>) -> ChannelRecord {
        ChannelRecord {
            id: id.to_string(),
            display_name: format!("Channel {id}"),
            handle: None,
            image_url: None,
            description: None,
            subscriber_count: subs,
            total_view_count: views,
            video_count: 10,
            country: "KR".to_string(),
            category_id: "music".to_string(),
            created_at: at,
            last_updated: at,
        }
    }

    fn page(page: u32, page_size: u32) -> PageRequest {
        PageRequest { page, page_size }
    }

    #[tokio::test]
    async fn upsert_is_idempotent_and_keeps_created_at() {
        let store = MemoryRankingStore::new();
        let t0 = Utc::now() - Duration::hours(2);
        let t1 = Utc::now();

        assert_eq!(
            store.upsert(&record("a", 100, 1_000, t0)).await.unwrap(),
            UpsertOutcome::Created
        );
        assert_eq!(
            store.upsert(&record("a", 150, 1_500, t1)).await.unwrap(),
            UpsertOutcome::Updated
        );
        assert_eq!(store.len(), 1);

        let stored = store.get("a").unwrap();
        assert_eq!(stored.record.subscriber_count, 150);
        assert_eq!(stored.record.created_at, t0);
        assert_eq!(stored.record.last_updated, t1);
    }

    #[tokio::test]
    async fn older_record_never_overwrites_newer() {
        let store = MemoryRankingStore::new();
        let newer = Utc::now();
        let older = newer - Duration::minutes(5);

        store.upsert(&record("a", 500, 5_000, newer)).await.unwrap();
        let outcome = store.upsert(&record("a", 1, 1, older)).await.unwrap();

        assert_eq!(outcome, UpsertOutcome::SkippedStale);
        assert_eq!(store.get("a").unwrap().record.subscriber_count, 500);
    }

    #[tokio::test]
    async fn weekly_change_is_measured_against_rolling_baseline() {
        let store = MemoryRankingStore::new();
        let t0 = Utc::now() - Duration::days(10);
        let t1 = t0 + Duration::days(3);
        let t2 = t0 + Duration::days(8);

        store.upsert(&record("a", 100, 1_000, t0)).await.unwrap();
        store.upsert(&record("a", 130, 1_400, t1)).await.unwrap();
        let within_week = store.get("a").unwrap();
        assert_eq!(within_week.weekly_subscriber_change, 30);
        assert_eq!(within_week.weekly_view_change, 400);

        // Baseline is now eight days old and rolls to the t1 snapshot.
        store.upsert(&record("a", 160, 1_500, t2)).await.unwrap();
        let rolled = store.get("a").unwrap();
        assert_eq!(rolled.weekly_subscriber_change, 30);
        assert_eq!(rolled.weekly_view_change, 100);
    }

    #[tokio::test]
    async fn query_orders_descending_with_id_tiebreak_and_pages() {
        let store = MemoryRankingStore::new();
        let now = Utc::now();
        for (id, subs) in [("c", 10), ("a", 30), ("b", 30), ("d", 5)] {
            store.upsert(&record(id, subs, 0, now)).await.unwrap();
        }

        let (first, total) = store
            .query(&RankingFilter::default(), SortKey::Subscribers, page(1, 2))
            .await
            .unwrap();
        let ids: Vec<&str> = first.iter().map(|c| c.record.id.as_str()).collect();
        assert_eq!(total, 4);
        assert_eq!(ids, vec!["a", "b"]);

        let (second, _) = store
            .query(&RankingFilter::default(), SortKey::Subscribers, page(2, 2))
            .await
            .unwrap();
        let ids: Vec<&str> = second.iter().map(|c| c.record.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "d"]);

        let (beyond, total) = store
            .query(&RankingFilter::default(), SortKey::Subscribers, page(9, 2))
            .await
            .unwrap();
        assert!(beyond.is_empty());
        assert_eq!(total, 4);
    }

    #[tokio::test]
    async fn query_and_count_respect_filter() {
        let store = MemoryRankingStore::new();
        let now = Utc::now();
        let mut us = record("us1", 10, 0, now);
        us.country = "US".to_string();
        store.upsert(&us).await.unwrap();
        store.upsert(&record("kr1", 20, 0, now)).await.unwrap();

        let filter = RankingFilter {
            country: Some("us".to_string()),
            category: None,
        };
        assert_eq!(store.count(&filter).await.unwrap(), 1);
        let (items, total) = store
            .query(&filter, SortKey::Subscribers, page(1, 10))
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(items[0].record.id, "us1");
    }

    #[tokio::test]
    async fn fresh_ids_reports_recently_refreshed_channels() {
        let store = MemoryRankingStore::new();
        let now = Utc::now();
        store
            .upsert(&record("old", 1, 1, now - Duration::days(2)))
            .await
            .unwrap();
        store.upsert(&record("new", 1, 1, now)).await.unwrap();

        let ids = vec!["old".to_string(), "new".to_string(), "missing".to_string()];
        let fresh = store
            .fresh_ids(&ids, now - Duration::hours(24))
            .await
            .unwrap();
        assert_eq!(fresh, HashSet::from(["new".to_string()]));
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_operation() {
        let store = MemoryRankingStore::new();
        store.set_unavailable(true);
        let result = store.count(&RankingFilter::default()).await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        store.set_unavailable(false);
        assert_eq!(store.count(&RankingFilter::default()).await.unwrap(), 0);
    }
}
