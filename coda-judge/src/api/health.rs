//! Health check endpoints

use axum::{extract::State, routing::get, Json, Router};
use serde_json::json;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let uptime_seconds = (chrono::Utc::now() - state.startup_time).num_seconds();
    Json(json!({
        "status": "ok",
        "service": "coda-judge",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": uptime_seconds,
    }))
}

/// GET /health/ready
///
/// Verifies the database answers before reporting ready.
pub async fn ready(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    sqlx::query("SELECT 1")
        .execute(&state.db)
        .await
        .map_err(|e| ApiError::Internal(format!("Database not ready: {}", e)))?;

    Ok(Json(json!({ "ready": true })))
}

/// Health route table
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(ready))
}
