//! Rating session API handlers
//!
//! POST /session/open, /session/navigate, /session/select, /session/score,
//! /session/submit, /session/skip, /session/finish, /session/close;
//! GET /session/subject

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::RatingContext;
use crate::services::{
    ChoiceRole, FinalizeSummary, NavTarget, PendingSelection, ProgressCounts, RatingSession,
    SubjectFilter, SubjectView,
};
use crate::AppState;

/// POST /session/open request
#[derive(Debug, Deserialize)]
pub struct OpenSessionRequest {
    pub context: RatingContext,
}

/// Navigation action verbs
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NavigateAction {
    Next,
    Prev,
    Jump,
    Subject,
    /// Re-resolve the current position (e.g. after a filter change)
    Reload,
}

/// POST /session/navigate request
#[derive(Debug, Deserialize)]
pub struct NavigateRequest {
    pub action: NavigateAction,
    /// Target index for `jump`
    pub index: Option<usize>,
    /// Target subject for `subject`
    pub subject_id: Option<Uuid>,
    /// Filter to apply; omitted keeps the active filter
    pub filter: Option<SubjectFilter>,
}

/// POST /session/select request
#[derive(Debug, Deserialize)]
pub struct SelectRequest {
    pub role: ChoiceRole,
    pub item_index: usize,
}

/// POST /session/score request
#[derive(Debug, Deserialize)]
pub struct ScoreRequest {
    pub value: f64,
}

/// Session snapshot returned by every session endpoint
#[derive(Debug, Serialize)]
pub struct SessionStateResponse {
    pub context: RatingContext,
    pub filter: SubjectFilter,
    /// Cursor position within the filtered list
    pub index: usize,
    /// Filtered list length
    pub filtered_total: usize,
    pub subject: Option<SubjectView>,
    pub selection: PendingSelection,
    pub can_submit: bool,
    pub counts: Vec<ProgressCounts>,
}

fn session_state(session: &RatingSession) -> SessionStateResponse {
    let (index, filtered_total) = session.position();
    SessionStateResponse {
        context: session.context(),
        filter: session.filter(),
        index,
        filtered_total,
        subject: session.view().cloned(),
        selection: session.selection().clone(),
        can_submit: session.can_submit(),
        counts: session.counts().to_vec(),
    }
}

/// POST /session/open
///
/// Open the one interactive review pass. 409 when a session is already open.
pub async fn open_session(
    State(state): State<AppState>,
    Json(request): Json<OpenSessionRequest>,
) -> ApiResult<Json<SessionStateResponse>> {
    let mut slot = state.session.write().await;
    if slot.is_some() {
        return Err(ApiError::Conflict(
            "A rating session is already open".to_string(),
        ));
    }

    let session = RatingSession::open(
        state.db.clone(),
        state.event_bus.clone(),
        state.engine.clone(),
        state.finalizer.clone(),
        state.progress.notifier(),
        &state.config,
        request.context,
    )
    .await?;

    state.progress.set_context(Some(request.context));

    tracing::info!(
        context_kind = request.context.kind_str(),
        context_id = %request.context.id(),
        "Rating session opened"
    );

    let response = session_state(&session);
    *slot = Some(session);
    Ok(Json(response))
}

/// GET /session/subject
pub async fn get_subject(State(state): State<AppState>) -> ApiResult<Json<SessionStateResponse>> {
    let slot = state.session.read().await;
    let session = slot
        .as_ref()
        .ok_or_else(|| ApiError::Conflict("No open rating session".to_string()))?;
    Ok(Json(session_state(session)))
}

/// POST /session/navigate
pub async fn navigate(
    State(state): State<AppState>,
    Json(request): Json<NavigateRequest>,
) -> ApiResult<Json<SessionStateResponse>> {
    let mut slot = state.session.write().await;
    let session = slot
        .as_mut()
        .ok_or_else(|| ApiError::Conflict("No open rating session".to_string()))?;

    let target = match request.action {
        NavigateAction::Next => NavTarget::Next,
        NavigateAction::Prev => NavTarget::Prev,
        NavigateAction::Reload => NavTarget::Current,
        NavigateAction::Jump => NavTarget::Index(request.index.ok_or_else(|| {
            ApiError::BadRequest("'jump' requires an index".to_string())
        })?),
        NavigateAction::Subject => NavTarget::Subject(request.subject_id.ok_or_else(|| {
            ApiError::BadRequest("'subject' requires a subject_id".to_string())
        })?),
    };
    let filter = request.filter.unwrap_or_else(|| session.filter());

    session.load_subject(target, filter).await?;
    Ok(Json(session_state(session)))
}

/// POST /session/select
pub async fn select(
    State(state): State<AppState>,
    Json(request): Json<SelectRequest>,
) -> ApiResult<Json<SessionStateResponse>> {
    let mut slot = state.session.write().await;
    let session = slot
        .as_mut()
        .ok_or_else(|| ApiError::Conflict("No open rating session".to_string()))?;
    session.select(request.role, request.item_index)?;
    Ok(Json(session_state(session)))
}

/// POST /session/score
pub async fn set_score(
    State(state): State<AppState>,
    Json(request): Json<ScoreRequest>,
) -> ApiResult<Json<SessionStateResponse>> {
    let mut slot = state.session.write().await;
    let session = slot
        .as_mut()
        .ok_or_else(|| ApiError::Conflict("No open rating session".to_string()))?;
    session.set_score(request.value)?;
    Ok(Json(session_state(session)))
}

/// POST /session/submit
pub async fn submit(State(state): State<AppState>) -> ApiResult<Json<SessionStateResponse>> {
    let mut slot = state.session.write().await;
    let session = slot
        .as_mut()
        .ok_or_else(|| ApiError::Conflict("No open rating session".to_string()))?;
    session.submit().await?;
    Ok(Json(session_state(session)))
}

/// POST /session/skip
pub async fn skip(State(state): State<AppState>) -> ApiResult<Json<SessionStateResponse>> {
    let mut slot = state.session.write().await;
    let session = slot
        .as_mut()
        .ok_or_else(|| ApiError::Conflict("No open rating session".to_string()))?;
    session.skip().await?;
    Ok(Json(session_state(session)))
}

/// POST /session/finish
pub async fn finish(State(state): State<AppState>) -> ApiResult<Json<FinalizeSummary>> {
    let mut slot = state.session.write().await;
    let session = slot
        .as_mut()
        .ok_or_else(|| ApiError::Conflict("No open rating session".to_string()))?;
    let summary = session.finish().await?;
    Ok(Json(summary))
}

/// POST /session/close
pub async fn close_session(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let mut slot = state.session.write().await;
    if slot.take().is_none() {
        return Err(ApiError::Conflict("No open rating session".to_string()));
    }
    state.progress.set_context(None);
    tracing::info!("Rating session closed");
    Ok(Json(serde_json::json!({ "closed": true })))
}

/// Session route table
pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/session/open", post(open_session))
        .route("/session/subject", get(get_subject))
        .route("/session/navigate", post(navigate))
        .route("/session/select", post(select))
        .route("/session/score", post(set_score))
        .route("/session/submit", post(submit))
        .route("/session/skip", post(skip))
        .route("/session/finish", post(finish))
        .route("/session/close", post(close_session))
}
