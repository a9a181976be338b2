//! Judgment listing for results and overlay rendering
//!
//! GET /judgments lists every judgment one rater type produced for a context.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use coda_common::events::RaterType;

use crate::error::{ApiError, ApiResult};
use crate::models::{Judgment, RatingContext};
use crate::AppState;

/// GET /judgments query parameters
#[derive(Debug, Deserialize)]
pub struct JudgmentQuery {
    pub rater_type: RaterType,
    pub experiment_id: Option<Uuid>,
    pub collection_id: Option<Uuid>,
    pub variable_id: Option<Uuid>,
}

/// GET /judgments
pub async fn list_judgments(
    State(state): State<AppState>,
    Query(query): Query<JudgmentQuery>,
) -> ApiResult<Json<Vec<Judgment>>> {
    let context = match (query.experiment_id, query.collection_id, query.variable_id) {
        (Some(experiment_id), _, _) => RatingContext::Experiment { experiment_id },
        (None, Some(collection_id), Some(variable_id)) => RatingContext::Collection {
            collection_id,
            variable_id,
        },
        _ => {
            return Err(ApiError::BadRequest(
                "Judgment listing requires an experiment_id or a collection_id with variable_id"
                    .to_string(),
            ))
        }
    };

    let judgments =
        crate::db::judgments::list_by_rater(&state.db, &context, query.rater_type).await?;
    Ok(Json(judgments))
}

/// Judgment route table
pub fn judgment_routes() -> Router<AppState> {
    Router::new().route("/judgments", get(list_judgments))
}
