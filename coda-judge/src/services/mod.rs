//! Judgment core services

pub mod batch_rater;
pub mod finalizer;
pub mod locks;
pub mod navigation;
pub mod progress;
pub mod rater_client;
pub mod scoring_client;
pub mod session;

pub use batch_rater::{BatchRatingEngine, BatchState, BatchStatus, BatchTuning, InteractiveOutcome};
pub use finalizer::{FinalizeSummary, ScoreFinalizer, ScoreRequestResult};
pub use locks::{RateKey, RatingLocks};
pub use navigation::{filtered_subjects, NavigationState, SubjectFilter};
pub use progress::{compute_counts, ProgressBroadcaster, ProgressCounts, ProgressNotifier};
pub use rater_client::{HttpRater, ItemPayload, RaterError, RatingResponse, RatingRubric, SubjectRater};
pub use scoring_client::{HttpScorer, Score, ScoreComputer, ScoringError};
pub use session::{ChoiceRole, NavTarget, PendingSelection, RatingSession, SubjectView};
