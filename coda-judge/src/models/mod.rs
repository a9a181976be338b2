//! Data model for the judgment core

pub mod experiment;
pub mod judgment;
pub mod subject;
pub mod variable;

pub use experiment::{Experiment, ExperimentStatus};
pub use judgment::{choice_agreement, Judgment, JudgmentKey, JudgmentOutcome};
pub use subject::{Item, RatingContext, Subject};
pub use variable::{ReasoningDepth, ScaleAnchor, Variable, VariableScale};
