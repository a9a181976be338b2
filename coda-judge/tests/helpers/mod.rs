//! Shared test fixtures: tempfile databases, seeded contexts, and scripted
//! rater/scorer implementations.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tokio::sync::mpsc;
use uuid::Uuid;

use coda_common::config::CodaConfig;
use coda_common::events::{EventBus, RaterType};

use coda_judge::models::{
    Experiment, Item, RatingContext, ReasoningDepth, ScaleAnchor, Subject, Variable, VariableScale,
};
use coda_judge::services::{
    BatchRatingEngine, BatchTuning, ItemPayload, ProgressBroadcaster, RaterError, RatingResponse,
    RatingRubric, Score, ScoreComputer, ScoreFinalizer, ScoringError, SubjectRater,
};

/// Fresh tempfile-backed database with tables initialized
pub async fn setup_db() -> (TempDir, SqlitePool) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let pool = coda_judge::db::init_database_pool(&dir.path().join("coda.db"))
        .await
        .expect("init database");
    (dir, pool)
}

/// Test configuration with fast debounce
pub fn test_config(auto_rate_on_view: bool) -> CodaConfig {
    let mut config = CodaConfig::default();
    config.auto_rate_on_view = auto_rate_on_view;
    config.progress_debounce_ms = 10;
    config
}

/// Seed a BWS experiment with `subject_count` tuples of `tuple_size` items
pub async fn seed_experiment(
    pool: &SqlitePool,
    subject_count: usize,
    tuple_size: usize,
) -> (Experiment, Vec<Subject>) {
    let experiment = Experiment::new(
        "Which excerpt best expresses the code?",
        tuple_size as i64,
        3,
        "balanced_incomplete_block",
        "counting",
        vec![RaterType::Human],
    );
    coda_judge::db::experiments::save_experiment(pool, &experiment)
        .await
        .expect("save experiment");

    let context = experiment.context();
    let mut subjects = Vec::with_capacity(subject_count);
    for position in 0..subject_count {
        let mut item_ids = Vec::with_capacity(tuple_size);
        for item_index in 0..tuple_size {
            let item = Item {
                id: Uuid::new_v4(),
                content: format!("subject {} item {}", position, item_index),
                source_ref: None,
            };
            coda_judge::db::items::save_item(pool, &item)
                .await
                .expect("save item");
            item_ids.push(item.id);
        }
        let subject = Subject {
            id: Uuid::new_v4(),
            context,
            item_ids,
            position: position as i64,
        };
        coda_judge::db::subjects::save_subject(pool, &subject)
            .await
            .expect("save subject");
        subjects.push(subject);
    }

    (experiment, subjects)
}

/// Seed a collection + variable context with single-item excerpt subjects
pub async fn seed_collection(
    pool: &SqlitePool,
    subject_count: usize,
) -> (RatingContext, Variable, Vec<Subject>) {
    let variable = Variable {
        id: Uuid::new_v4(),
        name: "Relevance".to_string(),
        scale: VariableScale::Discrete { min: 1, max: 5 },
        anchors: vec![
            ScaleAnchor {
                point: 1.0,
                text: "Not relevant".to_string(),
            },
            ScaleAnchor {
                point: 5.0,
                text: "Highly relevant".to_string(),
            },
        ],
        reasoning_depth: ReasoningDepth::Brief,
    };
    coda_judge::db::variables::save_variable(pool, &variable)
        .await
        .expect("save variable");

    let context = RatingContext::Collection {
        collection_id: Uuid::new_v4(),
        variable_id: variable.id,
    };

    let mut subjects = Vec::with_capacity(subject_count);
    for position in 0..subject_count {
        let item = Item {
            id: Uuid::new_v4(),
            content: format!("excerpt {}", position),
            source_ref: Some(format!("doc-{}", position)),
        };
        coda_judge::db::items::save_item(pool, &item)
            .await
            .expect("save item");

        let subject = Subject {
            id: Uuid::new_v4(),
            context,
            item_ids: vec![item.id],
            position: position as i64,
        };
        coda_judge::db::subjects::save_subject(pool, &subject)
            .await
            .expect("save subject");
        subjects.push(subject);
    }

    (context, variable, subjects)
}

/// One recorded rating call
#[derive(Debug, Clone)]
pub struct CallRecord {
    /// Item ids shipped in the call (identifies the subject in fixtures)
    pub item_ids: Vec<Uuid>,
    pub started: Instant,
    pub ended: Instant,
}

/// Scripted rater: records call intervals, optional delay and failures,
/// optional start notifications for deterministic pause tests
pub struct MockRater {
    pub delay: Duration,
    pub calls: Arc<Mutex<Vec<CallRecord>>>,
    pub fail_first_items: HashSet<Uuid>,
    pub started_tx: Option<mpsc::UnboundedSender<usize>>,
    counter: AtomicUsize,
}

impl MockRater {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            calls: Arc::new(Mutex::new(Vec::new())),
            fail_first_items: HashSet::new(),
            started_tx: None,
            counter: AtomicUsize::new(0),
        }
    }

    pub fn with_start_notifications(mut self, tx: mpsc::UnboundedSender<usize>) -> Self {
        self.started_tx = Some(tx);
        self
    }

    pub fn failing_for(mut self, first_item_ids: impl IntoIterator<Item = Uuid>) -> Self {
        self.fail_first_items = first_item_ids.into_iter().collect();
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("call log poisoned").len()
    }

    pub fn recorded_calls(&self) -> Vec<CallRecord> {
        self.calls.lock().expect("call log poisoned").clone()
    }
}

#[async_trait]
impl SubjectRater for MockRater {
    fn rater_id(&self) -> &str {
        "mock-ai"
    }

    async fn rate(
        &self,
        items: &[ItemPayload],
        rubric: &RatingRubric,
    ) -> Result<RatingResponse, RaterError> {
        let index = self.counter.fetch_add(1, Ordering::SeqCst);
        if let Some(tx) = &self.started_tx {
            let _ = tx.send(index);
        }

        let started = Instant::now();
        tokio::time::sleep(self.delay).await;
        let ended = Instant::now();

        self.calls.lock().expect("call log poisoned").push(CallRecord {
            item_ids: items.iter().map(|i| i.item_id).collect(),
            started,
            ended,
        });

        let first = items
            .first()
            .ok_or_else(|| RaterError::Api("empty item payload".to_string()))?;
        if self.fail_first_items.contains(&first.item_id) {
            return Err(RaterError::Api("scripted failure".to_string()));
        }

        let outcome = match rubric {
            RatingRubric::BestWorst { .. } => {
                let last = items.last().expect("non-empty items");
                coda_judge::models::JudgmentOutcome::Choice {
                    best_item_id: first.item_id,
                    worst_item_id: last.item_id,
                }
            }
            RatingRubric::Scale { variable } => {
                let value = match variable.scale {
                    VariableScale::Discrete { min, .. } => min as f64,
                    VariableScale::Continuous { min, .. } => min,
                };
                coda_judge::models::JudgmentOutcome::Score { value }
            }
        };

        Ok(RatingResponse {
            outcome,
            reasoning: Some("scripted reasoning".to_string()),
        })
    }
}

/// One recorded scoring request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoringCall {
    pub context: RatingContext,
    pub rater_type: Option<RaterType>,
}

/// Scripted scorer recording requests; optionally failing every call
pub struct MockScorer {
    pub calls: Arc<Mutex<Vec<ScoringCall>>>,
    pub fail: bool,
}

impl MockScorer {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            fail: true,
        }
    }

    pub fn recorded_calls(&self) -> Vec<ScoringCall> {
        self.calls.lock().expect("scoring log poisoned").clone()
    }
}

#[async_trait]
impl ScoreComputer for MockScorer {
    async fn compute_scores(
        &self,
        context: &RatingContext,
        rater: Option<RaterType>,
    ) -> Result<Vec<Score>, ScoringError> {
        self.calls
            .lock()
            .expect("scoring log poisoned")
            .push(ScoringCall {
                context: *context,
                rater_type: rater,
            });

        if self.fail {
            return Err(ScoringError::Api("scripted scoring failure".to_string()));
        }

        Ok(vec![Score {
            item_id: Uuid::new_v4(),
            value: 1.0,
        }])
    }
}

/// Engine wired to a mock rater with test tuning
pub fn make_engine(
    pool: &SqlitePool,
    event_bus: &EventBus,
    rater: Arc<dyn SubjectRater>,
    batch_size: usize,
) -> (Arc<BatchRatingEngine>, Arc<ProgressBroadcaster>) {
    let progress = Arc::new(ProgressBroadcaster::spawn(
        pool.clone(),
        event_bus.clone(),
        Duration::from_millis(10),
    ));
    let engine = Arc::new(BatchRatingEngine::new(
        pool.clone(),
        event_bus.clone(),
        rater,
        BatchTuning {
            batch_size,
            batch_delay: Duration::from_millis(10),
        },
        progress.notifier(),
    ));
    (engine, progress)
}

/// Finalizer wired to a mock scorer
pub fn make_finalizer(
    pool: &SqlitePool,
    event_bus: &EventBus,
    scorer: Arc<dyn ScoreComputer>,
) -> Arc<ScoreFinalizer> {
    Arc::new(ScoreFinalizer::new(
        pool.clone(),
        event_bus.clone(),
        scorer,
    ))
}

/// Poll until the predicate holds or the timeout elapses
pub async fn wait_until<F>(timeout: Duration, mut predicate: F)
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    while !predicate() {
        assert!(
            Instant::now() < deadline,
            "condition not reached within {:?}",
            timeout
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
