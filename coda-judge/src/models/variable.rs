//! Rating variables and scales

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Scale shape for a rating variable
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VariableScale {
    /// Integer points in [min, max]
    Discrete { min: i64, max: i64 },
    /// Real values in [min, max]
    Continuous { min: f64, max: f64 },
}

impl VariableScale {
    /// Whether a proposed score is representable on this scale
    pub fn accepts(&self, value: f64) -> bool {
        match self {
            VariableScale::Discrete { min, max } => {
                value.fract() == 0.0 && value >= *min as f64 && value <= *max as f64
            }
            VariableScale::Continuous { min, max } => value >= *min && value <= *max,
        }
    }
}

/// Anchor text attached to one point on the scale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleAnchor {
    /// Scale point the anchor describes
    pub point: f64,
    /// Anchor text shown to raters
    pub text: String,
}

/// How much reasoning the AI rater is asked to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningDepth {
    None,
    Brief,
    Detailed,
}

/// A named rating dimension for direct excerpt scoring
///
/// Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variable {
    /// Variable UUID
    pub id: Uuid,
    /// Display name
    pub name: String,
    /// Scale shape and bounds
    pub scale: VariableScale,
    /// Per-point anchor text
    pub anchors: Vec<ScaleAnchor>,
    /// Reasoning-depth preference for AI rating
    pub reasoning_depth: ReasoningDepth,
}

impl Variable {
    /// Validate a proposed score against the scale bounds
    pub fn validate_score(&self, value: f64) -> Result<(), String> {
        if self.scale.accepts(value) {
            Ok(())
        } else {
            Err(match self.scale {
                VariableScale::Discrete { min, max } => format!(
                    "Score {} not an integer point on the {}..{} scale for '{}'",
                    value, min, max, self.name
                ),
                VariableScale::Continuous { min, max } => format!(
                    "Score {} outside the {}..{} range for '{}'",
                    value, min, max, self.name
                ),
            })
        }
    }
}
