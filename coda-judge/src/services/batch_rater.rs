//! AI batch rating engine
//!
//! Processes a queue of subjects in batches of B concurrent rating calls.
//! Within a batch every member holds the (subject, variable) lock for the
//! duration of its call; the same lock set serves the interactive path, so at
//! most one rating call is ever in flight per key system-wide.
//!
//! Pause is a flag read only between batches: members of the current batch
//! always run to completion. Resume continues from the stored cursor,
//! skipping subjects rated or cached in the meantime. Stop clears queue,
//! cursor, and locks, but never cancels already-dispatched calls.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::Serialize;
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use coda_common::events::{CodaEvent, EventBus, RaterType};

use crate::db;
use crate::error::{EngineError, EngineResult};
use crate::models::{Judgment, RatingContext, Subject};

use super::locks::{RateKey, RatingLocks};
use super::progress::ProgressNotifier;
use super::rater_client::{ItemPayload, RatingResponse, RatingRubric, SubjectRater};

/// Engine tuning knobs
#[derive(Debug, Clone)]
pub struct BatchTuning {
    /// Concurrent rating calls per batch
    pub batch_size: usize,
    /// Delay between batches
    pub batch_delay: Duration,
}

impl Default for BatchTuning {
    fn default() -> Self {
        Self {
            batch_size: 10,
            batch_delay: Duration::from_millis(250),
        }
    }
}

/// Engine lifecycle state as reported to the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    Idle,
    Running,
    Paused,
}

/// Snapshot of the engine for status queries
#[derive(Debug, Clone, Serialize)]
pub struct BatchStatus {
    pub state: BatchState,
    pub queued: usize,
    pub cursor: usize,
    pub rated: usize,
    pub failed: usize,
}

/// Result of an interactive rating request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractiveOutcome {
    /// A call was issued and the judgment persisted
    Rated,
    /// The key was already judged or cached; no call issued
    AlreadyRated,
    /// Batch running or key in flight; "auto-rated shortly" notice emitted
    Suppressed,
}

/// Process-local job state
struct JobState {
    queue: Vec<Subject>,
    rubric: Option<RatingRubric>,
    variable_id: Option<Uuid>,
    cursor: usize,
    paused: bool,
    running: bool,
    rated: usize,
    failed: usize,
    cancel: CancellationToken,
}

impl JobState {
    fn idle() -> Self {
        Self {
            queue: Vec::new(),
            rubric: None,
            variable_id: None,
            cursor: 0,
            paused: false,
            running: false,
            rated: 0,
            failed: 0,
            cancel: CancellationToken::new(),
        }
    }
}

/// What the run loop decided to do next
enum Step {
    Dispatch(Vec<Subject>, usize),
    Pause(usize),
    Complete(usize, usize),
    Stopped,
}

/// Bounded-concurrency AI rating engine
pub struct BatchRatingEngine {
    db: SqlitePool,
    event_bus: EventBus,
    rater: Arc<dyn SubjectRater>,
    locks: RatingLocks,
    cache: Mutex<HashMap<RateKey, RatingResponse>>,
    job: Mutex<JobState>,
    tuning: BatchTuning,
    progress: ProgressNotifier,
}

impl BatchRatingEngine {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        rater: Arc<dyn SubjectRater>,
        tuning: BatchTuning,
        progress: ProgressNotifier,
    ) -> Self {
        Self {
            db,
            event_bus,
            rater,
            locks: RatingLocks::new(),
            cache: Mutex::new(HashMap::new()),
            job: Mutex::new(JobState::idle()),
            tuning,
            progress,
        }
    }

    /// The shared in-flight lock set (tests assert on it)
    pub fn locks(&self) -> &RatingLocks {
        &self.locks
    }

    /// Whether a batch run is actively processing
    pub fn is_running(&self) -> bool {
        self.job.lock().expect("job state poisoned").running
    }

    /// Build the queue for a context and start the run loop
    ///
    /// Subjects already judged by the AI rater or cached for the
    /// (subject, variable) key are excluded up front. Returns the queue
    /// length.
    pub async fn start(self: Arc<Self>, context: RatingContext) -> EngineResult<usize> {
        if self.is_running() {
            return Err(EngineError::Navigation(
                "Batch rating already running".to_string(),
            ));
        }

        let rubric = self.build_rubric(&context).await?;
        let variable_id = context.variable_id();

        let subjects = db::subjects::list_subjects(&self.db, &context).await?;
        let judged = db::judgments::judged_subject_ids(&self.db, &context, RaterType::Ai).await?;

        let queue: Vec<Subject> = {
            let cache = self.cache.lock().expect("rating cache poisoned");
            subjects
                .into_iter()
                .filter(|s| {
                    !judged.contains(&s.id)
                        && !cache.contains_key(&RateKey::new(s.id, variable_id))
                })
                .collect()
        };
        let queued = queue.len();

        {
            let mut job = self.job.lock().expect("job state poisoned");
            if job.running {
                return Err(EngineError::Navigation(
                    "Batch rating already running".to_string(),
                ));
            }
            *job = JobState {
                queue,
                rubric: Some(rubric),
                variable_id,
                cursor: 0,
                paused: false,
                running: true,
                rated: 0,
                failed: 0,
                cancel: CancellationToken::new(),
            };
        }

        info!(
            queued,
            batch_size = self.tuning.batch_size,
            context_kind = context.kind_str(),
            context_id = %context.id(),
            "Batch rating started"
        );
        self.event_bus.emit_lossy(CodaEvent::BatchStarted {
            queued,
            batch_size: self.tuning.batch_size,
            timestamp: chrono::Utc::now(),
        });

        let engine = Arc::clone(&self);
        tokio::spawn(async move {
            engine.run_loop().await;
        });

        Ok(queued)
    }

    /// Request a pause; takes effect before the next batch starts
    pub fn pause(&self) {
        let mut job = self.job.lock().expect("job state poisoned");
        if job.running && !job.paused {
            job.paused = true;
            info!(cursor = job.cursor, "Batch pause requested, current batch will finish");
        }
    }

    /// Continue a paused run from the stored cursor
    pub fn resume(self: Arc<Self>) -> EngineResult<()> {
        let cursor = {
            let mut job = self.job.lock().expect("job state poisoned");
            if job.running {
                return Err(EngineError::Navigation(
                    "Batch rating already running".to_string(),
                ));
            }
            if !job.paused {
                return Err(EngineError::Navigation(
                    "No paused batch run to resume".to_string(),
                ));
            }
            job.paused = false;
            job.running = true;
            job.cursor
        };

        info!(cursor, "Batch rating resumed");
        self.event_bus.emit_lossy(CodaEvent::BatchResumed {
            cursor,
            timestamp: chrono::Utc::now(),
        });

        let engine = Arc::clone(&self);
        tokio::spawn(async move {
            engine.run_loop().await;
        });

        Ok(())
    }

    /// Stop the run: clear queue, cursor, and locks
    ///
    /// Already-dispatched calls in the current batch complete; the loop exits
    /// before the next batch.
    pub fn stop(&self) {
        let rated = {
            let mut job = self.job.lock().expect("job state poisoned");
            job.cancel.cancel();
            let rated = job.rated;
            job.queue.clear();
            job.cursor = 0;
            job.paused = false;
            rated
        };
        self.locks.clear();

        info!(rated, "Batch rating stopped");
        self.event_bus.emit_lossy(CodaEvent::BatchStopped {
            rated,
            timestamp: chrono::Utc::now(),
        });
    }

    /// Engine snapshot for status queries
    pub fn status(&self) -> BatchStatus {
        let job = self.job.lock().expect("job state poisoned");
        let state = if job.running {
            BatchState::Running
        } else if job.paused {
            BatchState::Paused
        } else {
            BatchState::Idle
        };
        BatchStatus {
            state,
            queued: job.queue.len(),
            cursor: job.cursor,
            rated: job.rated,
            failed: job.failed,
        }
    }

    /// Rate one subject opened interactively, under the shared lock/cache
    ///
    /// Suppressed (with an "auto-rated shortly" notice event) while the batch
    /// engine is running or the key is already in flight.
    pub async fn rate_interactive(
        &self,
        subject: &Subject,
        rubric: RatingRubric,
    ) -> EngineResult<InteractiveOutcome> {
        let key = RateKey::new(subject.id, subject.context.variable_id());

        if self.is_running() {
            self.event_bus.emit_lossy(CodaEvent::InteractiveRateSuppressed {
                subject_id: subject.id,
                reason: "batch engine is running; subject will be auto-rated shortly".to_string(),
                timestamp: chrono::Utc::now(),
            });
            return Ok(InteractiveOutcome::Suppressed);
        }

        if self
            .cache
            .lock()
            .expect("rating cache poisoned")
            .contains_key(&key)
        {
            return Ok(InteractiveOutcome::AlreadyRated);
        }
        if db::judgments::get_any(&self.db, subject.id, RaterType::Ai, key.variable_id)
            .await?
            .is_some()
        {
            return Ok(InteractiveOutcome::AlreadyRated);
        }

        let Some(_guard) = self.locks.try_acquire(key) else {
            self.event_bus.emit_lossy(CodaEvent::InteractiveRateSuppressed {
                subject_id: subject.id,
                reason: "a rating call for this subject is already in flight".to_string(),
                timestamp: chrono::Utc::now(),
            });
            return Ok(InteractiveOutcome::Suppressed);
        };

        self.event_bus.emit_lossy(CodaEvent::InteractiveRateStarted {
            subject_id: subject.id,
            timestamp: chrono::Utc::now(),
        });

        let call_started = Instant::now();
        match self.call_rater(subject, &rubric).await {
            Ok(response) => {
                let latency_ms = call_started.elapsed().as_millis() as i64;
                self.persist_response(subject, key, response, latency_ms)
                    .await?;
                Ok(InteractiveOutcome::Rated)
                // _guard releases the key here
            }
            Err(message) => {
                warn!(subject_id = %subject.id, error = %message, "Interactive rating call failed");
                Err(EngineError::Rater(message))
                // _guard releases the key here too
            }
        }
    }

    // ------------------------------------------------------------------
    // Run loop
    // ------------------------------------------------------------------

    async fn run_loop(self: Arc<Self>) {
        let started = Instant::now();
        let cancel = {
            self.job
                .lock()
                .expect("job state poisoned")
                .cancel
                .clone()
        };

        loop {
            let step = {
                let mut job = self.job.lock().expect("job state poisoned");
                if cancel.is_cancelled() {
                    job.running = false;
                    Step::Stopped
                } else if job.paused {
                    job.running = false;
                    Step::Pause(job.cursor)
                } else if job.cursor >= job.queue.len() {
                    job.running = false;
                    Step::Complete(job.rated, job.failed)
                } else {
                    let end = (job.cursor + self.tuning.batch_size).min(job.queue.len());
                    Step::Dispatch(job.queue[job.cursor..end].to_vec(), end)
                }
            };

            match step {
                Step::Stopped => {
                    debug!("Batch run loop exiting after stop");
                    break;
                }
                Step::Pause(cursor) => {
                    info!(cursor, "Batch paused after settling current batch");
                    self.event_bus.emit_lossy(CodaEvent::BatchPaused {
                        cursor,
                        timestamp: chrono::Utc::now(),
                    });
                    break;
                }
                Step::Complete(rated, failed) => {
                    let duration_seconds = started.elapsed().as_secs();
                    info!(rated, failed, duration_seconds, "Batch rating completed");
                    self.event_bus.emit_lossy(CodaEvent::BatchCompleted {
                        rated,
                        failed,
                        duration_seconds,
                        timestamp: chrono::Utc::now(),
                    });
                    break;
                }
                Step::Dispatch(batch, end) => {
                    self.dispatch_batch(batch).await;
                    {
                        // A stop while the batch was in flight already reset
                        // the cursor; leave it cleared
                        let mut job = self.job.lock().expect("job state poisoned");
                        if !cancel.is_cancelled() {
                            job.cursor = end;
                        }
                    }

                    // Short breather between batches; a stop cuts it short
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = tokio::time::sleep(self.tuning.batch_delay) => {}
                    }
                }
            }
        }
    }

    /// Dispatch one batch: concurrent calls for every member not locked,
    /// cached, or already judged. Waits for all members to settle.
    async fn dispatch_batch(&self, batch: Vec<Subject>) {
        let (rubric, variable_id) = {
            let job = self.job.lock().expect("job state poisoned");
            match job.rubric.clone() {
                Some(rubric) => (rubric, job.variable_id),
                // Stop cleared the job while this batch was being prepared
                None => return,
            }
        };

        let mut tasks = Vec::with_capacity(batch.len());
        for subject in batch {
            let key = RateKey::new(subject.id, variable_id);

            if self
                .cache
                .lock()
                .expect("rating cache poisoned")
                .contains_key(&key)
            {
                debug!(subject_id = %subject.id, "Cache hit, no rating call issued");
                continue;
            }

            match db::judgments::get_any(&self.db, subject.id, RaterType::Ai, variable_id).await {
                Ok(Some(_)) => {
                    debug!(subject_id = %subject.id, "Already judged, skipping");
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    // Systemic store trouble: report once, keep the batch going
                    warn!(subject_id = %subject.id, error = %e, "Store check failed, attempting rating anyway");
                }
            }

            let Some(guard) = self.locks.try_acquire(key) else {
                debug!(subject_id = %subject.id, "Key in flight elsewhere, skipped in this batch");
                continue;
            };

            tasks.push(self.rate_one(subject, key, rubric.clone(), guard));
        }

        join_all(tasks).await;
    }

    /// One batch member: call, persist or record failure, release the lock
    async fn rate_one(
        &self,
        subject: Subject,
        key: RateKey,
        rubric: RatingRubric,
        _guard: super::locks::RateGuard,
    ) {
        let call_started = Instant::now();
        let result = self.call_rater(&subject, &rubric).await;
        let latency_ms = call_started.elapsed().as_millis() as i64;

        match result {
            Ok(response) => {
                if let Err(e) = self
                    .persist_response(&subject, key, response, latency_ms)
                    .await
                {
                    warn!(subject_id = %subject.id, error = %e, "Failed to persist AI judgment");
                    self.record_failure(&subject, key, e.to_string());
                    return;
                }
                self.job.lock().expect("job state poisoned").rated += 1;
                self.event_bus.emit_lossy(CodaEvent::BatchItemRated {
                    subject_id: subject.id,
                    variable_id: key.variable_id,
                    latency_ms,
                    timestamp: chrono::Utc::now(),
                });
            }
            Err(message) => {
                warn!(subject_id = %subject.id, error = %message, "Rating call failed, subject skipped");
                self.record_failure(&subject, key, message);
            }
        }
        // _guard drops here: the lock is released on every exit path
    }

    fn record_failure(&self, subject: &Subject, key: RateKey, message: String) {
        self.job.lock().expect("job state poisoned").failed += 1;
        self.event_bus.emit_lossy(CodaEvent::BatchItemFailed {
            subject_id: subject.id,
            variable_id: key.variable_id,
            error: message,
            timestamp: chrono::Utc::now(),
        });
    }

    /// Persist a successful response, update the cache, nudge progress
    async fn persist_response(
        &self,
        subject: &Subject,
        key: RateKey,
        response: RatingResponse,
        latency_ms: i64,
    ) -> EngineResult<()> {
        let judgment = Judgment::new(
            subject.id,
            RaterType::Ai,
            self.rater.rater_id(),
            key.variable_id,
            response.outcome.clone(),
        )
        .with_reasoning(response.reasoning.clone())
        .with_latency(latency_ms);

        db::judgments::save(&self.db, &judgment).await?;

        self.cache
            .lock()
            .expect("rating cache poisoned")
            .insert(key, response);
        self.progress.mark_dirty();

        self.event_bus.emit_lossy(CodaEvent::JudgmentSaved {
            subject_id: subject.id,
            rater_type: RaterType::Ai,
            variable_id: key.variable_id,
            skipped: false,
            timestamp: chrono::Utc::now(),
        });

        Ok(())
    }

    async fn call_rater(
        &self,
        subject: &Subject,
        rubric: &RatingRubric,
    ) -> Result<RatingResponse, String> {
        let items = db::items::load_items(&self.db, &subject.item_ids)
            .await
            .map_err(|e| format!("Item load failed: {}", e))?;
        let payloads: Vec<ItemPayload> = items
            .into_iter()
            .map(|item| ItemPayload {
                item_id: item.id,
                content: item.content,
            })
            .collect();

        self.rater
            .rate(&payloads, rubric)
            .await
            .map_err(|e| e.to_string())
    }

    /// Resolve the rubric for a context
    pub async fn build_rubric(&self, context: &RatingContext) -> EngineResult<RatingRubric> {
        match context {
            RatingContext::Experiment { experiment_id } => {
                let experiment = db::experiments::load_experiment(&self.db, *experiment_id)
                    .await?
                    .ok_or_else(|| {
                        EngineError::Persistence(coda_common::Error::NotFound(format!(
                            "Experiment not found: {}",
                            experiment_id
                        )))
                    })?;
                Ok(RatingRubric::BestWorst {
                    criterion: experiment.criterion,
                })
            }
            RatingContext::Collection { variable_id, .. } => {
                let variable = db::variables::load_variable(&self.db, *variable_id)
                    .await?
                    .ok_or_else(|| {
                        EngineError::Persistence(coda_common::Error::NotFound(format!(
                            "Variable not found: {}",
                            variable_id
                        )))
                    })?;
                Ok(RatingRubric::Scale { variable })
            }
        }
    }
}
