use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chanrank_db::{CollectionRunPassRow, CollectionRunRow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::middleware::RequestId;

use super::{map_db_error, normalize_limit, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Deserialize)]
pub(super) struct CollectionRunsQuery {
    pub limit: Option<i64>,
}

/// A collection run with its per-pass outcomes.
#[derive(Debug, Serialize)]
pub(super) struct CollectionRunItem {
    collection_run_id: Uuid,
    run_type: String,
    trigger_source: String,
    status: String,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    records_processed: i32,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    passes: Vec<CollectionRunPassItem>,
}

impl CollectionRunItem {
    fn new(run: CollectionRunRow, passes: Vec<CollectionRunPassRow>) -> Self {
        Self {
            collection_run_id: run.public_id,
            run_type: run.run_type,
            trigger_source: run.trigger_source,
            status: run.status,
            started_at: run.started_at,
            completed_at: run.completed_at,
            records_processed: run.records_processed,
            error_message: run.error_message,
            created_at: run.created_at,
            passes: passes.into_iter().map(CollectionRunPassItem::from).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct CollectionRunPassItem {
    region: String,
    category: String,
    status: String,
    candidates_found: i32,
    records_processed: i32,
    error_message: Option<String>,
}

impl From<CollectionRunPassRow> for CollectionRunPassItem {
    fn from(row: CollectionRunPassRow) -> Self {
        Self {
            region: row.region,
            category: row.category,
            status: row.status,
            candidates_found: row.candidates_found,
            records_processed: row.records_processed,
            error_message: row.error_message,
        }
    }
}

/// `GET /api/v1/collection-runs`: newest runs first, each with its passes.
pub(super) async fn list_collection_runs(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<CollectionRunsQuery>,
) -> Result<Json<ApiResponse<Vec<CollectionRunItem>>>, ApiError> {
    let db_error = |e: &chanrank_db::DbError| map_db_error(req_id.0.clone(), e);

    let runs = chanrank_db::list_collection_runs(&state.pool, normalize_limit(query.limit))
        .await
        .map_err(|e| db_error(&e))?;

    let mut data = Vec::with_capacity(runs.len());
    for run in runs {
        let passes = chanrank_db::list_collection_run_passes(&state.pool, run.id)
            .await
            .map_err(|e| db_error(&e))?;
        data.push(CollectionRunItem::new(run, passes));
    }

    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_row() -> CollectionRunRow {
        CollectionRunRow {
            id: 3,
            public_id: Uuid::new_v4(),
            run_type: "channels".to_string(),
            trigger_source: "scheduler".to_string(),
            status: "succeeded".to_string(),
            started_at: Some(Utc::now()),
            completed_at: Some(Utc::now()),
            records_processed: 12,
            error_message: Some("stopped early: all upstream API keys exhausted".to_string()),
            created_at: Utc::now(),
        }
    }

    fn pass_row(region: &str, status: &str) -> CollectionRunPassRow {
        CollectionRunPassRow {
            id: 1,
            collection_run_id: 3,
            region: region.to_string(),
            category: "music".to_string(),
            status: status.to_string(),
            candidates_found: 40,
            records_processed: 12,
            error_message: Some("all upstream API keys exhausted".to_string()),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn collection_run_item_serializes_passes() {
        let run = run_row();
        let public_id = run.public_id;
        let passes = vec![pass_row("KR", "partial"), pass_row("JP", "skipped")];
        let item = CollectionRunItem::new(run, passes);

        let json = serde_json::to_value(&item).expect("serialize collection run");
        assert_eq!(json["collection_run_id"], public_id.to_string());
        assert_eq!(json["run_type"], "channels");
        assert_eq!(json["passes"].as_array().map(Vec::len), Some(2));
        assert_eq!(json["passes"][0]["status"], "partial");
        assert_eq!(json["passes"][0]["candidates_found"], 40);
        assert!(json.get("id").is_none());
        assert!(json["passes"][0].get("collection_run_id").is_none());
    }
}
