//! Scoring service client
//!
//! Numeric score-fitting (counting / Bradley-Terry) is an external
//! collaborator; this module only carries requests to it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use coda_common::config::ScoringConfig;
use coda_common::events::RaterType;

use crate::models::RatingContext;

/// One fitted score entry from the scoring service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Score {
    pub item_id: Uuid,
    pub value: f64,
}

/// Scoring call failure (non-fatal to experiment completion)
#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// External scoring service seam
#[async_trait]
pub trait ScoreComputer: Send + Sync {
    /// Compute scores for a context view
    ///
    /// `rater` restricts the fit to one producer's judgments; None requests
    /// the combined view.
    async fn compute_scores(
        &self,
        context: &RatingContext,
        rater: Option<RaterType>,
    ) -> Result<Vec<Score>, ScoringError>;
}

#[derive(Debug, Serialize)]
struct ScoreRequest<'a> {
    context: &'a RatingContext,
    rater_type: Option<RaterType>,
}

#[derive(Debug, Deserialize)]
struct ScoreResponseBody {
    scores: Vec<Score>,
}

/// HTTP client for the external scoring service
pub struct HttpScorer {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpScorer {
    pub fn new(config: &ScoringConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }
}

#[async_trait]
impl ScoreComputer for HttpScorer {
    async fn compute_scores(
        &self,
        context: &RatingContext,
        rater: Option<RaterType>,
    ) -> Result<Vec<Score>, ScoringError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&ScoreRequest {
                context,
                rater_type: rater,
            })
            .send()
            .await
            .map_err(|e| ScoringError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ScoringError::Api(format!("{}: {}", status, body)));
        }

        let body: ScoreResponseBody = response
            .json()
            .await
            .map_err(|e| ScoringError::Parse(e.to_string()))?;

        Ok(body.scores)
    }
}
