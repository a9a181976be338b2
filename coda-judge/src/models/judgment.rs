//! Judgments and outcomes

use chrono::{DateTime, Utc};
use coda_common::events::RaterType;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The unique key a judgment is stored under
///
/// At most one judgment exists per key; re-saving updates in place.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JudgmentKey {
    pub subject_id: Uuid,
    pub rater_type: RaterType,
    pub rater_id: String,
    /// Set for excerpt-rating judgments, None for BWS tuples
    pub variable_id: Option<Uuid>,
}

/// What the rater decided
///
/// Skips are an explicit variant rather than sentinel item ids, so no real
/// choice can ever collide with "seen, no choice".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JudgmentOutcome {
    /// Best/worst choice within a BWS tuple
    Choice {
        best_item_id: Uuid,
        worst_item_id: Uuid,
    },
    /// Direct score against a variable scale
    Score { value: f64 },
    /// Subject seen but skipped without a real choice (BWS only)
    Skipped,
}

impl JudgmentOutcome {
    /// Whether this is the skip sentinel rather than a real choice or score
    pub fn is_skip(&self) -> bool {
        matches!(self, JudgmentOutcome::Skipped)
    }
}

/// One persisted judgment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Judgment {
    /// Subject the judgment applies to
    pub subject_id: Uuid,
    /// Producer type
    pub rater_type: RaterType,
    /// Producer identity within the type
    pub rater_id: String,
    /// Variable for excerpt-rating judgments, None for BWS
    pub variable_id: Option<Uuid>,
    /// The decision
    pub outcome: JudgmentOutcome,
    /// Rater-provided reasoning text
    pub reasoning: Option<String>,
    /// Time from presentation (or dispatch) to decision
    pub latency_ms: Option<i64>,
    /// First save time
    pub created_at: DateTime<Utc>,
    /// Last save time (upserts bump this)
    pub updated_at: DateTime<Utc>,
}

impl Judgment {
    /// Create a new judgment stamped with the current time
    pub fn new(
        subject_id: Uuid,
        rater_type: RaterType,
        rater_id: impl Into<String>,
        variable_id: Option<Uuid>,
        outcome: JudgmentOutcome,
    ) -> Self {
        let now = Utc::now();
        Self {
            subject_id,
            rater_type,
            rater_id: rater_id.into(),
            variable_id,
            outcome,
            reasoning: None,
            latency_ms: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Attach reasoning text
    pub fn with_reasoning(mut self, reasoning: Option<String>) -> Self {
        self.reasoning = reasoning;
        self
    }

    /// Attach decision latency
    pub fn with_latency(mut self, latency_ms: i64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }

    /// The storage key for this judgment
    pub fn key(&self) -> JudgmentKey {
        JudgmentKey {
            subject_id: self.subject_id,
            rater_type: self.rater_type,
            rater_id: self.rater_id.clone(),
            variable_id: self.variable_id,
        }
    }
}

/// Agreement between two best/worst overlays on the same tuple
///
/// 1.0 when both best and worst match, 0.5 when exactly one matches,
/// 0.0 when neither does. None unless both outcomes are real choices.
pub fn choice_agreement(a: &JudgmentOutcome, b: &JudgmentOutcome) -> Option<f32> {
    match (a, b) {
        (
            JudgmentOutcome::Choice {
                best_item_id: a_best,
                worst_item_id: a_worst,
            },
            JudgmentOutcome::Choice {
                best_item_id: b_best,
                worst_item_id: b_worst,
            },
        ) => {
            let matches = (a_best == b_best) as u32 + (a_worst == b_worst) as u32;
            Some(matches as f32 / 2.0)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn choice(best: Uuid, worst: Uuid) -> JudgmentOutcome {
        JudgmentOutcome::Choice {
            best_item_id: best,
            worst_item_id: worst,
        }
    }

    #[test]
    fn test_skip_is_distinguishable_from_any_choice() {
        let outcome = JudgmentOutcome::Skipped;
        assert!(outcome.is_skip());
        assert_ne!(outcome, choice(Uuid::new_v4(), Uuid::new_v4()));
        assert_ne!(outcome, JudgmentOutcome::Score { value: 0.0 });
    }

    #[test]
    fn test_agreement_full_partial_none() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let d = Uuid::new_v4();

        assert_eq!(choice_agreement(&choice(a, b), &choice(a, b)), Some(1.0));
        assert_eq!(choice_agreement(&choice(a, b), &choice(a, c)), Some(0.5));
        assert_eq!(choice_agreement(&choice(a, b), &choice(c, a)), Some(0.5));
        assert_eq!(choice_agreement(&choice(a, b), &choice(c, d)), Some(0.0));
    }

    #[test]
    fn test_agreement_requires_real_choices() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(
            choice_agreement(&choice(a, b), &JudgmentOutcome::Skipped),
            None
        );
        assert_eq!(
            choice_agreement(
                &JudgmentOutcome::Score { value: 3.0 },
                &JudgmentOutcome::Score { value: 3.0 }
            ),
            None
        );
    }

    #[test]
    fn test_outcome_serialization_tags() {
        let json = serde_json::to_value(&JudgmentOutcome::Skipped).unwrap();
        assert_eq!(json["kind"], "skipped");

        let json = serde_json::to_value(&JudgmentOutcome::Score { value: 4.0 }).unwrap();
        assert_eq!(json["kind"], "score");
        assert_eq!(json["value"], 4.0);
    }
}
