//! AI rating service client
//!
//! `SubjectRater` is the seam the batch engine and interactive path call
//! through; `HttpRater` is the production implementation against the external
//! rating service. Tests substitute scripted implementations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use coda_common::config::RaterConfig;

use crate::models::{JudgmentOutcome, Variable};

/// Content shipped to the rating service for one item
#[derive(Debug, Clone, Serialize)]
pub struct ItemPayload {
    pub item_id: Uuid,
    pub content: String,
}

/// What the rater is asked to judge
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RatingRubric {
    /// Pick best and worst within the tuple against a criterion
    BestWorst { criterion: String },
    /// Score a single excerpt on a variable scale
    Scale { variable: Variable },
}

/// A successful rating call result
#[derive(Debug, Clone)]
pub struct RatingResponse {
    pub outcome: JudgmentOutcome,
    pub reasoning: Option<String>,
}

/// Rating call failure
///
/// Any non-success (including timeouts, which the reqwest client enforces)
/// is a per-subject failure to the engine.
#[derive(Debug, Error)]
pub enum RaterError {
    /// Transport-level failure
    #[error("Network error: {0}")]
    Network(String),

    /// Service returned an error status or error body
    #[error("API error: {0}")]
    Api(String),

    /// Response body did not contain a usable outcome
    #[error("Parse error: {0}")]
    Parse(String),
}

/// External AI rater seam
#[async_trait]
pub trait SubjectRater: Send + Sync {
    /// Rater id written on judgments this rater produces
    fn rater_id(&self) -> &str;

    /// Rate one subject's items against a rubric
    async fn rate(
        &self,
        items: &[ItemPayload],
        rubric: &RatingRubric,
    ) -> Result<RatingResponse, RaterError>;
}

#[derive(Debug, Serialize)]
struct RateRequest<'a> {
    items: &'a [ItemPayload],
    rubric: &'a RatingRubric,
}

/// Wire shape of the rating service response
#[derive(Debug, Deserialize)]
struct RateResponseBody {
    best_item_id: Option<Uuid>,
    worst_item_id: Option<Uuid>,
    score: Option<f64>,
    reasoning: Option<String>,
}

/// HTTP client for the external rating service
pub struct HttpRater {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    rater_id: String,
}

impl HttpRater {
    pub fn new(config: &RaterConfig, rater_id: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            rater_id: rater_id.into(),
        })
    }
}

#[async_trait]
impl SubjectRater for HttpRater {
    fn rater_id(&self) -> &str {
        &self.rater_id
    }

    async fn rate(
        &self,
        items: &[ItemPayload],
        rubric: &RatingRubric,
    ) -> Result<RatingResponse, RaterError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&RateRequest { items, rubric });

        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RaterError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RaterError::Api(format!("{}: {}", status, body)));
        }

        let body: RateResponseBody = response
            .json()
            .await
            .map_err(|e| RaterError::Parse(e.to_string()))?;

        let outcome = match (rubric, body.best_item_id, body.worst_item_id, body.score) {
            (RatingRubric::BestWorst { .. }, Some(best), Some(worst), _) => {
                if best == worst {
                    return Err(RaterError::Parse(
                        "Rater returned identical best and worst items".to_string(),
                    ));
                }
                if !items.iter().any(|i| i.item_id == best)
                    || !items.iter().any(|i| i.item_id == worst)
                {
                    return Err(RaterError::Parse(
                        "Rater returned item ids outside the tuple".to_string(),
                    ));
                }
                JudgmentOutcome::Choice {
                    best_item_id: best,
                    worst_item_id: worst,
                }
            }
            (RatingRubric::Scale { variable }, _, _, Some(value)) => {
                variable
                    .validate_score(value)
                    .map_err(RaterError::Parse)?;
                JudgmentOutcome::Score { value }
            }
            _ => {
                return Err(RaterError::Parse(
                    "Rater response missing best/worst pair or score".to_string(),
                ))
            }
        };

        Ok(RatingResponse {
            outcome,
            reasoning: body.reasoning,
        })
    }
}
