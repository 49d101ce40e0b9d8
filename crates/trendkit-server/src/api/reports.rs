use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;
use trendkit_core::WeeklyTrendReport;
use trendkit_db::ReportIndexEntry;

use crate::middleware::RequestId;

use super::{map_pipeline_error, normalize_limit, ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct ReportsQuery {
    pub limit: Option<usize>,
}

/// Stored report index, most recent week first.
pub(super) async fn list_reports(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<ReportsQuery>,
) -> Result<Json<ApiResponse<Vec<ReportIndexEntry>>>, ApiError> {
    let mut entries = state
        .pipeline
        .list_trend_reports()
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;
    entries.truncate(normalize_limit(query.limit));
    Ok(Json(ApiResponse::new(entries, req_id.0)))
}

pub(super) async fn latest_report(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<WeeklyTrendReport>>, ApiError> {
    let report = state
        .pipeline
        .get_latest_trend_report()
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?
        .ok_or_else(|| ApiError::new(req_id.0.clone(), "not_found", "no reports stored yet"))?;
    Ok(Json(ApiResponse::new(report, req_id.0)))
}

pub(super) async fn get_report(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(week): Path<String>,
) -> Result<Json<ApiResponse<WeeklyTrendReport>>, ApiError> {
    let report = state
        .pipeline
        .get_trend_report(&week)
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?
        .ok_or_else(|| {
            ApiError::new(
                req_id.0.clone(),
                "not_found",
                format!("no report stored for {week}"),
            )
        })?;
    Ok(Json(ApiResponse::new(report, req_id.0)))
}
