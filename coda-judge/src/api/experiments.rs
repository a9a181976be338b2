//! Experiment API handlers
//!
//! POST /experiments/:id/rescore retries scoring from the results view

use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::services::FinalizeSummary;
use crate::AppState;

/// POST /experiments/:id/rescore
///
/// Re-request scores for a completed experiment after an earlier
/// scoring-service failure. Judgment coverage is unaffected either way.
pub async fn rescore_experiment(
    State(state): State<AppState>,
    Path(experiment_id): Path<Uuid>,
) -> ApiResult<Json<FinalizeSummary>> {
    let experiment = crate::db::experiments::load_experiment(&state.db, experiment_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Experiment not found: {}", experiment_id)))?;

    let summary = state
        .finalizer
        .finalize(&experiment.context(), Some(experiment.id))
        .await?;

    Ok(Json(summary))
}

/// Experiment route table
pub fn experiment_routes() -> Router<AppState> {
    Router::new().route("/experiments/:id/rescore", post(rescore_experiment))
}
