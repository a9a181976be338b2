//! coda-judge library interface
//!
//! The judgment coordination core of the Coda data-coding application: a
//! shared SQLite judgment store written by two producers (a human rating
//! session and an AI batch engine), a filter/navigation index, debounced
//! progress broadcasting, and score finalization, exposed to the
//! presentation layer over HTTP + SSE.

pub mod api;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

pub use crate::error::{ApiError, ApiResult, EngineError, EngineResult};

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use coda_common::config::CodaConfig;
use coda_common::events::EventBus;

use crate::services::{
    BatchRatingEngine, BatchTuning, ProgressBroadcaster, RatingSession, ScoreComputer,
    ScoreFinalizer, SubjectRater,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Shared SQLite connection pool
    pub db: SqlitePool,
    /// Event bus feeding the SSE stream
    pub event_bus: EventBus,
    /// Loaded configuration
    pub config: CodaConfig,
    /// AI batch rating engine (also owns the shared lock set and cache)
    pub engine: Arc<BatchRatingEngine>,
    /// Score finalizer
    pub finalizer: Arc<ScoreFinalizer>,
    /// Debounced progress broadcaster
    pub progress: Arc<ProgressBroadcaster>,
    /// The one open human rating session, if any
    pub session: Arc<RwLock<Option<RatingSession>>>,
    /// Service startup timestamp for uptime reporting
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    /// Wire up engine, finalizer, and broadcaster around the shared pool
    ///
    /// Must run inside a tokio runtime (the broadcaster spawns its task).
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        config: CodaConfig,
        rater: Arc<dyn SubjectRater>,
        scorer: Arc<dyn ScoreComputer>,
    ) -> Self {
        let progress = Arc::new(ProgressBroadcaster::spawn(
            db.clone(),
            event_bus.clone(),
            Duration::from_millis(config.progress_debounce_ms),
        ));

        let tuning = BatchTuning {
            batch_size: config.batch.batch_size,
            batch_delay: Duration::from_millis(config.batch.batch_delay_ms),
        };
        let engine = Arc::new(BatchRatingEngine::new(
            db.clone(),
            event_bus.clone(),
            rater,
            tuning,
            progress.notifier(),
        ));

        let finalizer = Arc::new(ScoreFinalizer::new(db.clone(), event_bus.clone(), scorer));

        Self {
            db,
            event_bus,
            config,
            engine,
            finalizer,
            progress,
            session: Arc::new(RwLock::new(None)),
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::session_routes())
        .merge(api::batch_routes())
        .merge(api::experiment_routes())
        .merge(api::judgment_routes())
        .merge(api::progress_routes())
        .merge(api::health_routes())
        .route("/events", get(api::event_stream))
        .with_state(state)
}
