use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chanrank_core::{RankingFilter, SortKey};
use serde::Deserialize;

use crate::middleware::RequestId;
use crate::rankings::{RankingError, RankingPage, RankingRequest};

use super::{ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Deserialize)]
pub(super) struct RankingsQuery {
    pub country: Option<String>,
    pub category: Option<String>,
    pub sort: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

pub(super) async fn get_rankings(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<RankingsQuery>,
) -> Result<Json<ApiResponse<RankingPage>>, ApiError> {
    let sort = match query.sort.as_deref() {
        Some(raw) => raw
            .parse::<SortKey>()
            .map_err(|message| ApiError::new(req_id.0.clone(), "validation_error", message))?,
        None => SortKey::default(),
    };
    let filter = RankingFilter {
        country: query.country,
        category: query.category,
    };
    let request = RankingRequest::new(
        &filter,
        sort,
        query.page,
        query.page_size,
        state.rankings.page_limits(),
    );

    let page = state
        .rankings
        .get_rankings(&request)
        .await
        .map_err(|e| match e {
            RankingError::ReferenceUnavailable(_) => {
                tracing::error!(error = %e, "rankings unavailable from every source");
                ApiError::new(
                    req_id.0.clone(),
                    "service_unavailable",
                    "rankings are temporarily unavailable",
                )
            }
        })?;

    Ok(Json(ApiResponse {
        data: page,
        meta: ResponseMeta::new(req_id.0),
    }))
}
