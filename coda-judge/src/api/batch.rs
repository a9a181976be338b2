//! AI batch engine API handlers
//!
//! POST /batch/start, /batch/pause, /batch/resume, /batch/stop;
//! GET /batch/status

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::models::RatingContext;
use crate::services::BatchStatus;
use crate::AppState;

/// POST /batch/start request
#[derive(Debug, Deserialize)]
pub struct StartBatchRequest {
    pub context: RatingContext,
}

/// POST /batch/start response
#[derive(Debug, Serialize)]
pub struct StartBatchResponse {
    /// Subjects queued after excluding judged and cached ones
    pub queued: usize,
    pub status: BatchStatus,
}

/// POST /batch/start
///
/// Queue the context's unjudged subjects and start the run loop.
/// 409 when a run is already active.
pub async fn start_batch(
    State(state): State<AppState>,
    Json(request): Json<StartBatchRequest>,
) -> ApiResult<Json<StartBatchResponse>> {
    let queued = state.engine.clone().start(request.context).await?;
    state.progress.set_context(Some(request.context));

    Ok(Json(StartBatchResponse {
        queued,
        status: state.engine.status(),
    }))
}

/// POST /batch/pause
///
/// Takes effect before the next batch; in-flight calls complete.
pub async fn pause_batch(State(state): State<AppState>) -> ApiResult<Json<BatchStatus>> {
    state.engine.pause();
    Ok(Json(state.engine.status()))
}

/// POST /batch/resume
///
/// Continue from the stored cursor; already-rated subjects are skipped.
pub async fn resume_batch(State(state): State<AppState>) -> ApiResult<Json<BatchStatus>> {
    state.engine.clone().resume()?;
    Ok(Json(state.engine.status()))
}

/// POST /batch/stop
///
/// Clears queue, cursor, and locks. Dispatched calls still complete.
pub async fn stop_batch(State(state): State<AppState>) -> ApiResult<Json<BatchStatus>> {
    state.engine.stop();
    Ok(Json(state.engine.status()))
}

/// GET /batch/status
pub async fn batch_status(State(state): State<AppState>) -> ApiResult<Json<BatchStatus>> {
    Ok(Json(state.engine.status()))
}

/// Batch route table
pub fn batch_routes() -> Router<AppState> {
    Router::new()
        .route("/batch/start", post(start_batch))
        .route("/batch/pause", post(pause_batch))
        .route("/batch/resume", post(resume_batch))
        .route("/batch/stop", post(stop_batch))
        .route("/batch/status", get(batch_status))
}
