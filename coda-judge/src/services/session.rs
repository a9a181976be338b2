//! Rating session controller
//!
//! Drives one human interactive review pass over a context: navigation
//! position, the pending selection buffer, submit/skip, and finish. One
//! session (one human operator) exists at a time; it is owned explicitly by
//! the application state, never by module globals.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::warn;
use uuid::Uuid;

use coda_common::config::CodaConfig;
use coda_common::events::{CodaEvent, EventBus, RaterType};

use crate::db;
use crate::error::{EngineError, EngineResult};
use crate::models::{
    choice_agreement, Experiment, ExperimentStatus, Item, Judgment, JudgmentOutcome,
    RatingContext, Subject, Variable,
};

use super::batch_rater::BatchRatingEngine;
use super::finalizer::{FinalizeSummary, ScoreFinalizer};
use super::navigation::{filtered_subjects, NavigationState, SubjectFilter};
use super::progress::{compute_counts, ProgressCounts, ProgressNotifier};
use super::rater_client::RatingRubric;

/// Best/worst marking role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChoiceRole {
    Best,
    Worst,
}

/// Where a load should land
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavTarget {
    /// Stay on the current cursor position (after a rebuild)
    Current,
    Next,
    Prev,
    Index(usize),
    Subject(Uuid),
}

/// Uncommitted selection state for the displayed subject
#[derive(Debug, Clone, Default, Serialize)]
pub struct PendingSelection {
    /// Item index marked best
    pub best: Option<usize>,
    /// Item index marked worst
    pub worst: Option<usize>,
    /// Chosen score (excerpt rating)
    pub score: Option<f64>,
}

impl PendingSelection {
    /// Mark an item for a role; taking an item from the opposite role clears
    /// that role
    pub fn select(&mut self, role: ChoiceRole, item_index: usize) {
        match role {
            ChoiceRole::Best => {
                if self.worst == Some(item_index) {
                    self.worst = None;
                }
                self.best = Some(item_index);
            }
            ChoiceRole::Worst => {
                if self.best == Some(item_index) {
                    self.best = None;
                }
                self.worst = Some(item_index);
            }
        }
    }

    pub fn clear(&mut self) {
        *self = PendingSelection::default();
    }
}

/// Everything the presentation layer needs to render one subject
#[derive(Debug, Clone, Serialize)]
pub struct SubjectView {
    pub subject: Subject,
    pub items: Vec<Item>,
    /// Most recent AI judgment overlay, if any
    pub ai_judgment: Option<Judgment>,
    /// The operator's own judgment, if any
    pub human_judgment: Option<Judgment>,
    /// Best/worst agreement between the overlays (1.0 / 0.5 / 0.0)
    pub agreement: Option<f32>,
}

/// One human review pass over a context
pub struct RatingSession {
    db: SqlitePool,
    event_bus: EventBus,
    engine: Arc<BatchRatingEngine>,
    finalizer: Arc<ScoreFinalizer>,
    progress: ProgressNotifier,
    context: RatingContext,
    experiment: Option<Experiment>,
    variable: Option<Variable>,
    human_rater_id: String,
    auto_rate_on_view: bool,
    nav: NavigationState,
    current: Option<SubjectView>,
    selection: PendingSelection,
    loaded_at: Option<Instant>,
    counts: Vec<ProgressCounts>,
}

impl RatingSession {
    /// Open a session for a context and load the first subject (if any)
    #[allow(clippy::too_many_arguments)]
    pub async fn open(
        db: SqlitePool,
        event_bus: EventBus,
        engine: Arc<BatchRatingEngine>,
        finalizer: Arc<ScoreFinalizer>,
        progress: ProgressNotifier,
        config: &CodaConfig,
        context: RatingContext,
    ) -> EngineResult<Self> {
        let experiment = match context {
            RatingContext::Experiment { experiment_id } => Some(
                db::experiments::load_experiment(&db, experiment_id)
                    .await?
                    .ok_or_else(|| {
                        EngineError::Persistence(coda_common::Error::NotFound(format!(
                            "Experiment not found: {}",
                            experiment_id
                        )))
                    })?,
            ),
            RatingContext::Collection { .. } => None,
        };

        let variable = match context.variable_id() {
            Some(variable_id) => Some(
                db::variables::load_variable(&db, variable_id)
                    .await?
                    .ok_or_else(|| {
                        EngineError::Persistence(coda_common::Error::NotFound(format!(
                            "Variable not found: {}",
                            variable_id
                        )))
                    })?,
            ),
            None => None,
        };

        let subjects = db::subjects::list_subjects(&db, &context).await?;
        let ai_judged = db::judgments::judged_subject_ids(&db, &context, RaterType::Ai).await?;
        let human_judged = db::judgments::judged_subject_ids(&db, &context, RaterType::Human).await?;
        let nav = NavigationState::new(
            SubjectFilter::All,
            filtered_subjects(&subjects, &ai_judged, &human_judged, SubjectFilter::All),
        );

        let mut session = Self {
            db,
            event_bus,
            engine,
            finalizer,
            progress,
            context,
            experiment,
            variable,
            human_rater_id: config.human_rater_id.clone(),
            auto_rate_on_view: config.auto_rate_on_view,
            nav,
            current: None,
            selection: PendingSelection::default(),
            loaded_at: None,
            counts: Vec::new(),
        };

        if session.nav.is_empty() {
            session.refresh_counts().await;
        } else {
            session
                .load_subject(NavTarget::Current, SubjectFilter::All)
                .await?;
        }

        Ok(session)
    }

    /// The context this session reviews
    pub fn context(&self) -> RatingContext {
        self.context
    }

    /// The displayed subject, if one is loaded
    pub fn view(&self) -> Option<&SubjectView> {
        self.current.as_ref()
    }

    /// The uncommitted selection buffer
    pub fn selection(&self) -> &PendingSelection {
        &self.selection
    }

    /// Latest per-rater counts
    pub fn counts(&self) -> &[ProgressCounts] {
        &self.counts
    }

    /// Active filter
    pub fn filter(&self) -> SubjectFilter {
        self.nav.filter()
    }

    /// Cursor position and filtered list length
    pub fn position(&self) -> (usize, usize) {
        (self.nav.index(), self.nav.len())
    }

    /// Resolve a navigation target under a filter and load that subject
    ///
    /// The filtered list is recomputed from fresh judgment state; a filter
    /// change resets the position to 0. Load failures leave the previously
    /// displayed subject and navigation state intact.
    pub async fn load_subject(
        &mut self,
        target: NavTarget,
        filter: SubjectFilter,
    ) -> EngineResult<()> {
        let subjects = db::subjects::list_subjects(&self.db, &self.context).await?;
        let ai_judged =
            db::judgments::judged_subject_ids(&self.db, &self.context, RaterType::Ai).await?;
        let human_judged =
            db::judgments::judged_subject_ids(&self.db, &self.context, RaterType::Human).await?;

        // Work on a scratch cursor so failures leave the session untouched
        let mut nav = self.nav.clone();
        let anchor = self.current.as_ref().map(|v| v.subject.id);
        nav.rebuild(&subjects, &ai_judged, &human_judged, filter, anchor);

        match target {
            NavTarget::Current => {}
            NavTarget::Next => {
                nav.next();
            }
            NavTarget::Prev => {
                nav.prev();
            }
            NavTarget::Index(index) => {
                nav.jump_to(index);
            }
            NavTarget::Subject(subject_id) => {
                if nav.jump_to_subject(subject_id).is_none() {
                    return Err(EngineError::Navigation(format!(
                        "Subject {} is not in the current filtered view",
                        subject_id
                    )));
                }
            }
        }

        let subject_id = nav.current().ok_or_else(|| {
            EngineError::Navigation("No subjects match the active filter".to_string())
        })?;
        let subject = subjects
            .into_iter()
            .find(|s| s.id == subject_id)
            .ok_or_else(|| {
                EngineError::Persistence(coda_common::Error::Internal(format!(
                    "Subject {} missing from catalog",
                    subject_id
                )))
            })?;

        let view = self.fetch_view(subject).await?;

        // Auto-rate on view: one AI call for the opened subject, under the
        // engine's shared lock/cache (suppressed while the batch runs)
        if view.ai_judgment.is_none() && self.auto_rate_on_view {
            self.spawn_interactive(&view.subject);
        }

        self.nav = nav;
        self.current = Some(view);
        self.loaded_at = Some(Instant::now());
        self.selection.clear();
        self.refresh_counts().await;

        Ok(())
    }

    /// Mark an item as best or worst
    pub fn select(&mut self, role: ChoiceRole, item_index: usize) -> EngineResult<()> {
        let view = self
            .current
            .as_ref()
            .ok_or_else(|| EngineError::Navigation("No subject loaded".to_string()))?;
        if !view.subject.is_tuple() {
            return Err(EngineError::Validation(
                "Best/worst selection applies to comparison tuples".to_string(),
            ));
        }
        if item_index >= view.items.len() {
            return Err(EngineError::Validation(format!(
                "Item index {} out of range for a tuple of {}",
                item_index,
                view.items.len()
            )));
        }
        self.selection.select(role, item_index);
        Ok(())
    }

    /// Choose a score for the displayed excerpt
    pub fn set_score(&mut self, value: f64) -> EngineResult<()> {
        let view = self
            .current
            .as_ref()
            .ok_or_else(|| EngineError::Navigation("No subject loaded".to_string()))?;
        if view.subject.is_tuple() {
            return Err(EngineError::Validation(
                "Scores apply to single excerpts, not comparison tuples".to_string(),
            ));
        }
        let variable = self.variable.as_ref().ok_or_else(|| {
            EngineError::Validation("No scoring variable for this context".to_string())
        })?;
        variable
            .validate_score(value)
            .map_err(EngineError::Validation)?;
        self.selection.score = Some(value);
        Ok(())
    }

    /// Whether the selection buffer is complete enough to submit
    pub fn can_submit(&self) -> bool {
        match self.current.as_ref() {
            Some(view) if view.subject.is_tuple() => matches!(
                (self.selection.best, self.selection.worst),
                (Some(best), Some(worst)) if best != worst
            ),
            Some(_) => self.selection.score.is_some(),
            None => false,
        }
    }

    /// Persist the human judgment for the displayed subject
    ///
    /// On success the same subject reloads, merging the fresh human judgment
    /// with any AI judgment, preserving reviewer context; the session never
    /// auto-advances. Persistence failures surface without touching
    /// navigation state.
    pub async fn submit(&mut self) -> EngineResult<()> {
        let (subject, outcome) = {
            let view = self
                .current
                .as_ref()
                .ok_or_else(|| EngineError::Navigation("No subject loaded".to_string()))?;

            let outcome = if view.subject.is_tuple() {
                let (best, worst) = match (self.selection.best, self.selection.worst) {
                    (Some(best), Some(worst)) => (best, worst),
                    _ => {
                        return Err(EngineError::Validation(
                            "Both best and worst must be selected".to_string(),
                        ))
                    }
                };
                if best == worst {
                    return Err(EngineError::Validation(
                        "Best and worst must be distinct items".to_string(),
                    ));
                }
                JudgmentOutcome::Choice {
                    best_item_id: view.items[best].id,
                    worst_item_id: view.items[worst].id,
                }
            } else {
                let value = self.selection.score.ok_or_else(|| {
                    EngineError::Validation("A score must be chosen before submitting".to_string())
                })?;
                JudgmentOutcome::Score { value }
            };

            (view.subject.clone(), outcome)
        };

        let mut judgment = Judgment::new(
            subject.id,
            RaterType::Human,
            self.human_rater_id.clone(),
            subject.context.variable_id(),
            outcome,
        );
        judgment.latency_ms = self.loaded_at.map(|t| t.elapsed().as_millis() as i64);

        db::judgments::save(&self.db, &judgment).await?;

        self.mark_in_progress().await?;
        self.event_bus.emit_lossy(CodaEvent::JudgmentSaved {
            subject_id: subject.id,
            rater_type: RaterType::Human,
            variable_id: subject.context.variable_id(),
            skipped: false,
            timestamp: chrono::Utc::now(),
        });
        self.progress.mark_dirty();

        // Reload the same subject rather than auto-advancing
        match self.fetch_view(subject).await {
            Ok(view) => {
                self.current = Some(view);
                self.selection.clear();
            }
            Err(e) => {
                // The judgment is persisted; the stale view refreshes on the
                // next navigation
                warn!(error = %e, "Reload after submit failed");
            }
        }
        self.refresh_counts().await;

        Ok(())
    }

    /// Skip the displayed subject and advance under the unrated filter
    ///
    /// BWS tuples persist a skip sentinel (seen, no choice); excerpts are
    /// left unrated.
    pub async fn skip(&mut self) -> EngineResult<()> {
        let (subject_id, is_tuple, variable_id) = {
            let view = self
                .current
                .as_ref()
                .ok_or_else(|| EngineError::Navigation("No subject loaded".to_string()))?;
            (
                view.subject.id,
                view.subject.is_tuple(),
                view.subject.context.variable_id(),
            )
        };

        if is_tuple {
            let judgment = Judgment::new(
                subject_id,
                RaterType::Human,
                self.human_rater_id.clone(),
                variable_id,
                JudgmentOutcome::Skipped,
            );
            db::judgments::save(&self.db, &judgment).await?;
            self.mark_in_progress().await?;
            self.event_bus.emit_lossy(CodaEvent::JudgmentSaved {
                subject_id,
                rater_type: RaterType::Human,
                variable_id,
                skipped: true,
                timestamp: chrono::Utc::now(),
            });
            self.progress.mark_dirty();
        }

        // Advance under the unrated filter. A skipped tuple left the unrated
        // list, so re-resolving the cursor already lands on its successor; a
        // skipped excerpt stays unrated and needs an explicit step past it.
        self.load_subject(NavTarget::Current, SubjectFilter::Unrated)
            .await?;
        if !is_tuple && self.current.as_ref().map(|v| v.subject.id) == Some(subject_id) {
            self.load_subject(NavTarget::Next, SubjectFilter::Unrated)
                .await?;
        }
        Ok(())
    }

    /// Finish the pass: verify required-rater coverage, complete the
    /// experiment, then request scores
    ///
    /// Scoring failures are recorded and retryable; they never undo the
    /// completion itself.
    pub async fn finish(&mut self) -> EngineResult<FinalizeSummary> {
        let required = self
            .experiment
            .as_ref()
            .map(|e| e.required_raters.clone())
            .unwrap_or_else(|| vec![RaterType::Human]);

        let total = db::subjects::count_subjects(&self.db, &self.context).await?;
        for rater_type in &required {
            let rated = db::judgments::count_rated(&self.db, &self.context, *rater_type).await?;
            if rated < total {
                return Err(EngineError::Completion(format!(
                    "{} of {} subjects lack a {} judgment",
                    total - rated,
                    total,
                    rater_type.as_str()
                )));
            }
        }

        if let Some(experiment) = self.experiment.as_mut() {
            if experiment.status != ExperimentStatus::Completed {
                db::experiments::update_status(&self.db, experiment.id, ExperimentStatus::Completed)
                    .await?;
                experiment.transition_to(ExperimentStatus::Completed);
                self.event_bus.emit_lossy(CodaEvent::ExperimentCompleted {
                    experiment_id: experiment.id,
                    timestamp: chrono::Utc::now(),
                });
            }
        }

        self.finalizer
            .finalize(&self.context, self.experiment.as_ref().map(|e| e.id))
            .await
    }

    // ------------------------------------------------------------------

    async fn fetch_view(&self, subject: Subject) -> EngineResult<SubjectView> {
        let items = db::items::load_items(&self.db, &subject.item_ids).await?;
        let variable_id = subject.context.variable_id();

        let ai_judgment =
            db::judgments::get_any(&self.db, subject.id, RaterType::Ai, variable_id).await?;
        let human_judgment = db::judgments::get(
            &self.db,
            subject.id,
            RaterType::Human,
            &self.human_rater_id,
            variable_id,
        )
        .await?;

        let agreement = match (&human_judgment, &ai_judgment) {
            (Some(human), Some(ai)) => choice_agreement(&human.outcome, &ai.outcome),
            _ => None,
        };

        Ok(SubjectView {
            subject,
            items,
            ai_judgment,
            human_judgment,
            agreement,
        })
    }

    fn spawn_interactive(&self, subject: &Subject) {
        let rubric = if let Some(experiment) = self.experiment.as_ref() {
            RatingRubric::BestWorst {
                criterion: experiment.criterion.clone(),
            }
        } else if let Some(variable) = self.variable.as_ref() {
            RatingRubric::Scale {
                variable: variable.clone(),
            }
        } else {
            return;
        };

        let engine = Arc::clone(&self.engine);
        let subject = subject.clone();
        tokio::spawn(async move {
            if let Err(e) = engine.rate_interactive(&subject, rubric).await {
                warn!(subject_id = %subject.id, error = %e, "Interactive auto-rate failed");
            }
        });
    }

    /// First human interaction moves a draft experiment to in_progress
    async fn mark_in_progress(&mut self) -> EngineResult<()> {
        if let Some(experiment) = self.experiment.as_mut() {
            if experiment.status == ExperimentStatus::Draft {
                db::experiments::update_status(
                    &self.db,
                    experiment.id,
                    ExperimentStatus::InProgress,
                )
                .await?;
                experiment.transition_to(ExperimentStatus::InProgress);
            }
        }
        Ok(())
    }

    /// Best-effort count refresh; a failed count never blocks a loaded view
    async fn refresh_counts(&mut self) {
        match compute_counts(&self.db, &self.context).await {
            Ok(counts) => self.counts = counts,
            Err(e) => warn!(error = %e, "Progress count refresh failed"),
        }
    }
}
