//! Postgres-backed ranking store over the `channels` table.
//!
//! Counts are `BIGINT` in the schema; values above `i64::MAX` saturate on the
//! way in. Weekly change is `current - baseline`, where the baseline snapshot
//! rolls forward once it is at least [`BASELINE_WINDOW_DAYS`] old.

use std::collections::HashSet;

use async_trait::async_trait;
use chanrank_core::{
    ChannelRecord, PageRequest, RankingFilter, RankingStore, SortKey, StoreError, StoredChannel,
    UpsertOutcome,
};
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

/// Age at which the weekly-change baseline is replaced by the previous snapshot.
pub const BASELINE_WINDOW_DAYS: i64 = 7;

/// A row from the `channels` table with computed weekly deltas.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChannelRow {
    pub id: String,
    pub display_name: String,
    pub handle: Option<String>,
    pub image_url: Option<String>,
    pub description: Option<String>,
    pub subscriber_count: i64,
    pub total_view_count: i64,
    pub video_count: i64,
    pub country: String,
    pub category_id: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub weekly_subscriber_change: i64,
    pub weekly_view_change: i64,
}

fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl From<ChannelRow> for StoredChannel {
    fn from(row: ChannelRow) -> Self {
        StoredChannel {
            record: ChannelRecord {
                id: row.id,
                display_name: row.display_name,
                handle: row.handle,
                image_url: row.image_url,
                description: row.description,
                subscriber_count: to_u64(row.subscriber_count),
                total_view_count: to_u64(row.total_view_count),
                video_count: to_u64(row.video_count),
                country: row.country,
                category_id: row.category_id,
                created_at: row.created_at,
                last_updated: row.last_updated,
            },
            weekly_subscriber_change: row.weekly_subscriber_change,
            weekly_view_change: row.weekly_view_change,
        }
    }
}

const SELECT_COLUMNS: &str = "id, display_name, handle, image_url, description, \
     subscriber_count, total_view_count, video_count, country, category_id, \
     created_at, last_updated, \
     subscriber_count - baseline_subscriber_count AS weekly_subscriber_change, \
     total_view_count - baseline_view_count AS weekly_view_change";

const FILTER_CLAUSE: &str =
    "($1::TEXT IS NULL OR country = $1) AND ($2::TEXT IS NULL OR category_id = $2)";

/// SQL ordering expression for a sort key. Always descending.
fn order_expression(sort: SortKey) -> &'static str {
    match sort {
        SortKey::Subscribers => "subscriber_count",
        SortKey::WeeklySubscribers => "(subscriber_count - baseline_subscriber_count)",
        SortKey::Views => "total_view_count",
        SortKey::WeeklyViews => "(total_view_count - baseline_view_count)",
        SortKey::Engagement => {
            "((total_view_count::DOUBLE PRECISION / GREATEST(video_count, 1)) \
             / GREATEST(subscriber_count, 1))"
        }
    }
}

/// Inserts or refreshes a channel keyed by its upstream id.
///
/// A stored row with a newer `last_updated` wins: the write is skipped and
/// [`UpsertOutcome::SkippedStale`] returned. `created_at` is kept from the
/// first insert.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the statement fails.
pub async fn upsert_channel(
    pool: &PgPool,
    record: &ChannelRecord,
) -> Result<UpsertOutcome, DbError> {
    let sql = format!(
        "INSERT INTO channels ( \
             id, display_name, handle, image_url, description, \
             subscriber_count, total_view_count, video_count, country, category_id, \
             created_at, last_updated, \
             baseline_subscriber_count, baseline_view_count, baseline_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $6, $7, $12) \
         ON CONFLICT (id) DO UPDATE SET \
             display_name     = EXCLUDED.display_name, \
             handle           = EXCLUDED.handle, \
             image_url        = EXCLUDED.image_url, \
             description      = EXCLUDED.description, \
             subscriber_count = EXCLUDED.subscriber_count, \
             total_view_count = EXCLUDED.total_view_count, \
             video_count      = EXCLUDED.video_count, \
             country          = EXCLUDED.country, \
             category_id      = EXCLUDED.category_id, \
             last_updated     = EXCLUDED.last_updated, \
             baseline_subscriber_count = CASE \
                 WHEN EXCLUDED.last_updated - channels.baseline_at >= INTERVAL '{days} days' \
                 THEN channels.subscriber_count ELSE channels.baseline_subscriber_count END, \
             baseline_view_count = CASE \
                 WHEN EXCLUDED.last_updated - channels.baseline_at >= INTERVAL '{days} days' \
                 THEN channels.total_view_count ELSE channels.baseline_view_count END, \
             baseline_at = CASE \
                 WHEN EXCLUDED.last_updated - channels.baseline_at >= INTERVAL '{days} days' \
                 THEN channels.last_updated ELSE channels.baseline_at END \
         WHERE channels.last_updated <= EXCLUDED.last_updated \
         RETURNING (xmax = 0) AS created",
        days = BASELINE_WINDOW_DAYS
    );

    let created: Option<bool> = sqlx::query_scalar::<_, bool>(&sql)
        .bind(&record.id)
        .bind(&record.display_name)
        .bind(&record.handle)
        .bind(&record.image_url)
        .bind(&record.description)
        .bind(to_i64(record.subscriber_count))
        .bind(to_i64(record.total_view_count))
        .bind(to_i64(record.video_count))
        .bind(&record.country)
        .bind(&record.category_id)
        .bind(record.created_at)
        .bind(record.last_updated)
        .fetch_optional(pool)
        .await?;

    Ok(match created {
        Some(true) => UpsertOutcome::Created,
        Some(false) => UpsertOutcome::Updated,
        None => UpsertOutcome::SkippedStale,
    })
}

/// Number of channels matching `filter`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_channels(pool: &PgPool, filter: &RankingFilter) -> Result<u64, DbError> {
    let sql = format!("SELECT COUNT(*) FROM channels WHERE {FILTER_CLAUSE}");
    let count: i64 = sqlx::query_scalar::<_, i64>(&sql)
        .bind(filter.country.as_deref())
        .bind(filter.category.as_deref())
        .fetch_one(pool)
        .await?;
    Ok(to_u64(count))
}

/// One page of channels matching `filter`, ordered descending on `sort` with
/// ascending id as the tiebreak.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_ranked_channels(
    pool: &PgPool,
    filter: &RankingFilter,
    sort: SortKey,
    page: PageRequest,
) -> Result<Vec<StoredChannel>, DbError> {
    let sql = format!(
        "SELECT {SELECT_COLUMNS} FROM channels WHERE {FILTER_CLAUSE} \
         ORDER BY {order} DESC, id ASC \
         LIMIT $3 OFFSET $4",
        order = order_expression(sort)
    );
    let rows = sqlx::query_as::<_, ChannelRow>(&sql)
        .bind(filter.country.as_deref())
        .bind(filter.category.as_deref())
        .bind(i64::from(page.page_size))
        .bind(to_i64(page.offset()))
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(StoredChannel::from).collect())
}

/// Ids among `ids` refreshed at or after `since`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_fresh_channel_ids(
    pool: &PgPool,
    ids: &[String],
    since: DateTime<Utc>,
) -> Result<HashSet<String>, DbError> {
    if ids.is_empty() {
        return Ok(HashSet::new());
    }
    let rows = sqlx::query_scalar::<_, String>(
        "SELECT id FROM channels WHERE id = ANY($1) AND last_updated >= $2",
    )
    .bind(ids)
    .bind(since)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().collect())
}

/// [`RankingStore`] over a Postgres pool.
#[derive(Debug, Clone)]
pub struct PgRankingStore {
    pool: PgPool,
}

impl PgRankingStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl RankingStore for PgRankingStore {
    async fn upsert(&self, record: &ChannelRecord) -> Result<UpsertOutcome, StoreError> {
        Ok(upsert_channel(&self.pool, record).await?)
    }

    async fn count(&self, filter: &RankingFilter) -> Result<u64, StoreError> {
        Ok(count_channels(&self.pool, &filter.normalized()).await?)
    }

    async fn query(
        &self,
        filter: &RankingFilter,
        sort: SortKey,
        page: PageRequest,
    ) -> Result<(Vec<StoredChannel>, u64), StoreError> {
        let filter = filter.normalized();
        let total = count_channels(&self.pool, &filter).await?;
        let items = list_ranked_channels(&self.pool, &filter, sort, page).await?;
        Ok((items, total))
    }

    async fn fresh_ids(
        &self,
        ids: &[String],
        since: DateTime<Utc>,
    ) -> Result<HashSet<String>, StoreError> {
        Ok(list_fresh_channel_ids(&self.pool, ids, since).await?)
    }
}
