use axum::{extract::State, Extension, Json};
use serde::Serialize;
use trendkit_core::{
    Category, CollectorVariant, HealthVerdict, PipelineStatus, SourceHealth, SourceStatus,
};

use crate::middleware::RequestId;

use super::{map_pipeline_error, ApiError, ApiResponse, AppState};

#[derive(Debug, Serialize)]
pub(super) struct SourceItem {
    name: String,
    category: Category,
    variant: CollectorVariant,
    /// Position within the category, 0 is tried first.
    priority: usize,
    status: Option<SourceStatus>,
    health: Option<HealthVerdict>,
}

/// Last persisted run with this process's cached health overlaid.
/// `data` is `null` before the first run.
pub(super) async fn pipeline_status(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<Option<PipelineStatus>>>, ApiError> {
    let status = state
        .pipeline
        .get_pipeline_status()
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;
    Ok(Json(ApiResponse::new(status, req_id.0)))
}

/// Configured sources in priority order. Never probes.
pub(super) async fn list_sources(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Json<ApiResponse<Vec<SourceItem>>> {
    let pipeline = &state.pipeline;
    let statuses = pipeline.get_source_statuses();
    let health = pipeline.cached_health();

    let mut priority = [0usize; 2];
    let items = pipeline
        .registry()
        .describe()
        .into_iter()
        .map(|(category, name, variant)| {
            let slot = &mut priority[usize::from(category == Category::Posts)];
            let item = SourceItem {
                status: statuses.iter().find(|s| s.source == name).cloned(),
                health: health
                    .iter()
                    .find(|h| h.source == name)
                    .and_then(|h| h.verdict.clone()),
                name,
                category,
                variant,
                priority: *slot,
            };
            *slot += 1;
            item
        })
        .collect();

    Json(ApiResponse::new(items, req_id.0))
}

/// Probe every source now and return the fresh verdicts.
pub(super) async fn check_sources(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Json<ApiResponse<Vec<SourceHealth>>> {
    let results = state.pipeline.check_all_sources().await;
    let unhealthy = results
        .iter()
        .filter(|h| h.verdict.as_ref().is_some_and(|v| !v.healthy))
        .count();
    tracing::info!(
        checked = results.len(),
        unhealthy,
        "on-demand source health sweep"
    );
    Json(ApiResponse::new(results, req_id.0))
}
