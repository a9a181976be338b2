//! Score finalization
//!
//! After full judgment coverage, requests combined scores and per-rater
//! scores from the external scoring service. A scoring failure never undoes
//! completion; it is recorded on the experiment row and retried from the
//! results view.

use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use coda_common::events::{CodaEvent, EventBus, RaterType};

use crate::db;
use crate::error::EngineResult;
use crate::models::RatingContext;

use super::scoring_client::ScoreComputer;

/// Outcome of one scoring request
#[derive(Debug, Clone, Serialize)]
pub struct ScoreRequestResult {
    /// None for the combined view
    pub rater_type: Option<RaterType>,
    /// Score entries returned on success
    pub score_count: usize,
    /// Failure message, if the request failed
    pub error: Option<String>,
}

/// Summary of a finalization pass
#[derive(Debug, Clone, Serialize)]
pub struct FinalizeSummary {
    pub results: Vec<ScoreRequestResult>,
    pub all_succeeded: bool,
}

/// Requests external score fitting for completed contexts
pub struct ScoreFinalizer {
    db: SqlitePool,
    event_bus: EventBus,
    scorer: Arc<dyn ScoreComputer>,
}

impl ScoreFinalizer {
    pub fn new(db: SqlitePool, event_bus: EventBus, scorer: Arc<dyn ScoreComputer>) -> Self {
        Self {
            db,
            event_bus,
            scorer,
        }
    }

    /// Request combined scores and per-rater scores for each rater type with
    /// at least one judgment
    ///
    /// Failures are collected per request rather than raised; the first one
    /// is recorded on the experiment row for the results view to retry.
    pub async fn finalize(
        &self,
        context: &RatingContext,
        experiment_id: Option<Uuid>,
    ) -> EngineResult<FinalizeSummary> {
        let mut results = Vec::new();

        results.push(self.request(context, None).await);

        for rater_type in [RaterType::Ai, RaterType::Human] {
            let rated = db::judgments::count_rated(&self.db, context, rater_type).await?;
            if rated > 0 {
                results.push(self.request(context, Some(rater_type)).await);
            }
        }

        let first_error = results.iter().find_map(|r| r.error.clone());
        if let Some(id) = experiment_id {
            db::experiments::record_scoring_result(&self.db, id, first_error.as_deref()).await?;
        }

        let all_succeeded = first_error.is_none();
        info!(
            requests = results.len(),
            all_succeeded, "Score finalization pass finished"
        );

        Ok(FinalizeSummary {
            results,
            all_succeeded,
        })
    }

    async fn request(
        &self,
        context: &RatingContext,
        rater_type: Option<RaterType>,
    ) -> ScoreRequestResult {
        match self.scorer.compute_scores(context, rater_type).await {
            Ok(scores) => {
                self.event_bus.emit_lossy(CodaEvent::ScoresComputed {
                    rater_type,
                    count: scores.len(),
                    timestamp: chrono::Utc::now(),
                });
                ScoreRequestResult {
                    rater_type,
                    score_count: scores.len(),
                    error: None,
                }
            }
            Err(e) => {
                warn!(
                    rater_type = ?rater_type,
                    error = %e,
                    "Scoring request failed (retryable from results view)"
                );
                self.event_bus.emit_lossy(CodaEvent::ScoringFailed {
                    rater_type,
                    error: e.to_string(),
                    timestamp: chrono::Utc::now(),
                });
                ScoreRequestResult {
                    rater_type,
                    score_count: 0,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}
