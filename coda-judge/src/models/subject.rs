//! Subjects, items, and rating contexts

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The collection a subject set belongs to
///
/// A subject belongs to exactly one context: a BWS experiment, or a
/// collection paired with a scoring variable for direct excerpt rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RatingContext {
    /// Best-Worst Scaling experiment over item tuples
    Experiment { experiment_id: Uuid },
    /// Direct scoring of single excerpts against one variable
    Collection {
        collection_id: Uuid,
        variable_id: Uuid,
    },
}

impl RatingContext {
    /// Stable discriminator used in database columns and log fields
    pub fn kind_str(&self) -> &'static str {
        match self {
            RatingContext::Experiment { .. } => "experiment",
            RatingContext::Collection { .. } => "collection",
        }
    }

    /// The owning experiment or collection id
    pub fn id(&self) -> Uuid {
        match self {
            RatingContext::Experiment { experiment_id } => *experiment_id,
            RatingContext::Collection { collection_id, .. } => *collection_id,
        }
    }

    /// Variable for excerpt-rating contexts, None for BWS experiments
    pub fn variable_id(&self) -> Option<Uuid> {
        match self {
            RatingContext::Experiment { .. } => None,
            RatingContext::Collection { variable_id, .. } => Some(*variable_id),
        }
    }

    /// Variable id as stored in the database ('' for BWS)
    pub fn variable_column(&self) -> String {
        self.variable_id()
            .map(|v| v.to_string())
            .unwrap_or_default()
    }
}

/// A rateable unit: a tuple of items (BWS) or a single excerpt
///
/// Immutable once created; the ordered item references come from the external
/// tuple-design step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subject {
    /// Subject UUID
    pub id: Uuid,
    /// Owning context
    pub context: RatingContext,
    /// Ordered item references (1 for excerpt rating, K>=2 for BWS tuples)
    pub item_ids: Vec<Uuid>,
    /// Display/navigation order within the context
    pub position: i64,
}

impl Subject {
    /// Whether this subject is a BWS comparison tuple (vs a single excerpt)
    pub fn is_tuple(&self) -> bool {
        self.item_ids.len() >= 2
    }
}

/// A content unit (transcript chunk, comment, document excerpt)
///
/// Read-only to the judgment core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    /// Item UUID
    pub id: Uuid,
    /// Display/rating text
    pub content: String,
    /// Provenance reference (source document, timestamp range, etc.)
    pub source_ref: Option<String>,
}
