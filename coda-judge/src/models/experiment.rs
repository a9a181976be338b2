//! Experiment lifecycle state machine
//!
//! Experiments progress draft -> in_progress -> completed. The first human
//! interaction moves a draft to in_progress; completion requires every
//! subject to carry at least one judgment from each required rater.

use chrono::{DateTime, Utc};
use coda_common::events::RaterType;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Experiment lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStatus {
    /// Created, no human interaction yet
    Draft,
    /// Rating underway
    InProgress,
    /// Full required-rater coverage reached
    Completed,
}

impl ExperimentStatus {
    /// Stable string form used in database columns
    pub fn as_str(&self) -> &'static str {
        match self {
            ExperimentStatus::Draft => "draft",
            ExperimentStatus::InProgress => "in_progress",
            ExperimentStatus::Completed => "completed",
        }
    }
}

impl std::str::FromStr for ExperimentStatus {
    type Err = coda_common::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(ExperimentStatus::Draft),
            "in_progress" => Ok(ExperimentStatus::InProgress),
            "completed" => Ok(ExperimentStatus::Completed),
            other => Err(coda_common::Error::InvalidInput(format!(
                "Unknown experiment status: {}",
                other
            ))),
        }
    }
}

/// A Best-Worst Scaling experiment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    /// Experiment UUID
    pub id: Uuid,
    /// Lifecycle status
    pub status: ExperimentStatus,
    /// The question raters judge tuples against
    pub criterion: String,
    /// Items per comparison tuple (K)
    pub tuple_size: i64,
    /// Target appearances per item across the design
    pub target_appearances: i64,
    /// External tuple-design method name
    pub design_method: String,
    /// External score-fitting method name (counting, bradley_terry, ...)
    pub scoring_method: String,
    /// Raters whose coverage gates completion
    pub required_raters: Vec<RaterType>,
    /// When scores were last computed successfully
    pub scored_at: Option<DateTime<Utc>>,
    /// Last scoring-service failure, retryable from the results view
    pub last_scoring_error: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl Experiment {
    /// Create a draft experiment
    pub fn new(
        criterion: impl Into<String>,
        tuple_size: i64,
        target_appearances: i64,
        design_method: impl Into<String>,
        scoring_method: impl Into<String>,
        required_raters: Vec<RaterType>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            status: ExperimentStatus::Draft,
            criterion: criterion.into(),
            tuple_size,
            target_appearances,
            design_method: design_method.into(),
            scoring_method: scoring_method.into(),
            required_raters,
            scored_at: None,
            last_scoring_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Transition to a new status
    pub fn transition_to(&mut self, new_status: ExperimentStatus) {
        self.status = new_status;
        self.updated_at = Utc::now();
    }

    /// The context rating operations address this experiment by
    pub fn context(&self) -> crate::models::RatingContext {
        crate::models::RatingContext::Experiment {
            experiment_id: self.id,
        }
    }
}
