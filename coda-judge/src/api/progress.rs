//! On-demand progress counts
//!
//! GET /progress runs count queries for an explicit context, or the open
//! session's context when none is given.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::RatingContext;
use crate::services::{compute_counts, ProgressCounts};
use crate::AppState;

/// GET /progress query parameters
#[derive(Debug, Deserialize)]
pub struct ProgressQuery {
    pub experiment_id: Option<Uuid>,
    pub collection_id: Option<Uuid>,
    pub variable_id: Option<Uuid>,
}

/// GET /progress
pub async fn get_progress(
    State(state): State<AppState>,
    Query(query): Query<ProgressQuery>,
) -> ApiResult<Json<Vec<ProgressCounts>>> {
    let context = match (query.experiment_id, query.collection_id, query.variable_id) {
        (Some(experiment_id), _, _) => RatingContext::Experiment { experiment_id },
        (None, Some(collection_id), Some(variable_id)) => RatingContext::Collection {
            collection_id,
            variable_id,
        },
        (None, Some(_), None) => {
            return Err(ApiError::BadRequest(
                "Collection progress requires a variable_id".to_string(),
            ))
        }
        _ => {
            let slot = state.session.read().await;
            slot.as_ref()
                .map(|session| session.context())
                .ok_or_else(|| {
                    ApiError::BadRequest(
                        "No context given and no rating session open".to_string(),
                    )
                })?
        }
    };

    let counts = compute_counts(&state.db, &context).await?;
    Ok(Json(counts))
}

/// Progress route table
pub fn progress_routes() -> Router<AppState> {
    Router::new().route("/progress", get(get_progress))
}
