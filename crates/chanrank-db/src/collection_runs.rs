//! `collection_runs` bookkeeping plus one `collection_run_passes` row per
//! (region, category) pass.
//!
//! A run moves `queued` → `running` → `succeeded`/`failed`; each move is a
//! guarded `UPDATE` so an out-of-order call surfaces as
//! [`DbError::InvalidCollectionRunTransition`].

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

const RUN_COLUMNS: &str = "id, public_id, run_type, trigger_source, status, \
     started_at, completed_at, records_processed, error_message, created_at";

const PASS_COLUMNS: &str = "id, collection_run_id, region, category, status, \
     candidates_found, records_processed, error_message, created_at";

/// Lifecycle states stored in `collection_runs.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl RunStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CollectionRunRow {
    pub id: i64,
    pub public_id: Uuid,
    pub run_type: String,
    pub trigger_source: String,
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Channels written across all passes.
    pub records_processed: i32,
    /// Failure reason, or the early-stop note on a succeeded run.
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CollectionRunPassRow {
    pub id: i64,
    pub collection_run_id: i64,
    pub region: String,
    pub category: String,
    /// `succeeded`, `partial`, `failed` or `skipped`.
    pub status: String,
    pub candidates_found: i32,
    pub records_processed: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Outcome of one pass, as recorded against its run.
#[derive(Debug, Clone)]
pub struct PassResult<'a> {
    pub region: &'a str,
    pub category: &'a str,
    pub status: &'a str,
    pub candidates_found: i32,
    pub records_processed: i32,
    pub error_message: Option<&'a str>,
}

/// Creates a `queued` run with a fresh public id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_collection_run(
    pool: &PgPool,
    run_type: &str,
    trigger_source: &str,
) -> Result<CollectionRunRow, DbError> {
    let sql = format!(
        "INSERT INTO collection_runs (public_id, run_type, trigger_source, status) \
         VALUES ($1, $2, $3, $4) RETURNING {RUN_COLUMNS}"
    );
    let row = sqlx::query_as::<_, CollectionRunRow>(&sql)
        .bind(Uuid::new_v4())
        .bind(run_type)
        .bind(trigger_source)
        .bind(RunStatus::Queued.as_str())
        .fetch_one(pool)
        .await?;
    Ok(row)
}

/// Moves run `id` from `from` to `to`. `completed_at` is stamped for terminal
/// states and `started_at` for `running`; `records` and `message` overwrite
/// their columns only when given.
async fn transition(
    pool: &PgPool,
    id: i64,
    from: RunStatus,
    to: RunStatus,
    records: Option<i32>,
    message: Option<&str>,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE collection_runs SET \
             status            = $1, \
             started_at        = CASE WHEN $1 = 'running' THEN NOW() ELSE started_at END, \
             completed_at      = CASE WHEN $1 IN ('succeeded', 'failed') THEN NOW() \
                                      ELSE completed_at END, \
             records_processed = COALESCE($2, records_processed), \
             error_message     = COALESCE($3, error_message) \
         WHERE id = $4 AND status = $5",
    )
    .bind(to.as_str())
    .bind(records)
    .bind(message)
    .bind(id)
    .bind(from.as_str())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidCollectionRunTransition {
            id,
            expected_status: from.as_str(),
        });
    }
    Ok(())
}

/// `queued` → `running`.
///
/// # Errors
///
/// Returns [`DbError::InvalidCollectionRunTransition`] if the run is not
/// queued, or [`DbError::Sqlx`] if the update fails.
pub async fn start_collection_run(pool: &PgPool, id: i64) -> Result<(), DbError> {
    transition(pool, id, RunStatus::Queued, RunStatus::Running, None, None).await
}

/// `running` → `succeeded`. `note` lands in `error_message`; a run that
/// stopped early on quota exhaustion still succeeds but says so there.
///
/// # Errors
///
/// Returns [`DbError::InvalidCollectionRunTransition`] if the run is not
/// running, or [`DbError::Sqlx`] if the update fails.
pub async fn complete_collection_run(
    pool: &PgPool,
    id: i64,
    records_processed: i32,
    note: Option<&str>,
) -> Result<(), DbError> {
    transition(
        pool,
        id,
        RunStatus::Running,
        RunStatus::Succeeded,
        Some(records_processed),
        note,
    )
    .await
}

/// `running` → `failed`.
///
/// # Errors
///
/// Returns [`DbError::InvalidCollectionRunTransition`] if the run is not
/// running, or [`DbError::Sqlx`] if the update fails.
pub async fn fail_collection_run(
    pool: &PgPool,
    id: i64,
    error_message: &str,
) -> Result<(), DbError> {
    transition(
        pool,
        id,
        RunStatus::Running,
        RunStatus::Failed,
        None,
        Some(error_message),
    )
    .await
}

/// Most recent `limit` runs, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_collection_runs(
    pool: &PgPool,
    limit: i64,
) -> Result<Vec<CollectionRunRow>, DbError> {
    let sql = format!(
        "SELECT {RUN_COLUMNS} FROM collection_runs \
         ORDER BY created_at DESC, id DESC LIMIT $1"
    );
    let rows = sqlx::query_as::<_, CollectionRunRow>(&sql)
        .bind(limit)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Records a pass result; a second write for the same pass replaces the first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_collection_run_pass(
    pool: &PgPool,
    run_id: i64,
    result: &PassResult<'_>,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO collection_run_passes \
             (collection_run_id, region, category, status, \
              candidates_found, records_processed, error_message) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         ON CONFLICT (collection_run_id, region, category) DO UPDATE SET \
             status            = EXCLUDED.status, \
             candidates_found  = EXCLUDED.candidates_found, \
             records_processed = EXCLUDED.records_processed, \
             error_message     = EXCLUDED.error_message",
    )
    .bind(run_id)
    .bind(result.region)
    .bind(result.category)
    .bind(result.status)
    .bind(result.candidates_found)
    .bind(result.records_processed)
    .bind(result.error_message)
    .execute(pool)
    .await?;
    Ok(())
}

/// Pass rows of run `run_id`, ordered by region then category.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_collection_run_passes(
    pool: &PgPool,
    run_id: i64,
) -> Result<Vec<CollectionRunPassRow>, DbError> {
    let sql = format!(
        "SELECT {PASS_COLUMNS} FROM collection_run_passes \
         WHERE collection_run_id = $1 ORDER BY region, category"
    );
    let rows = sqlx::query_as::<_, CollectionRunPassRow>(&sql)
        .bind(run_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_status_strings_match_schema_check() {
        let all = [
            RunStatus::Queued,
            RunStatus::Running,
            RunStatus::Succeeded,
            RunStatus::Failed,
        ];
        let names: Vec<&str> = all.iter().map(|s| s.as_str()).collect();
        assert_eq!(names, vec!["queued", "running", "succeeded", "failed"]);
    }

    #[test]
    fn column_lists_match_row_types() {
        assert_eq!(RUN_COLUMNS.split(',').count(), 10);
        assert_eq!(PASS_COLUMNS.split(',').count(), 9);
    }
}
