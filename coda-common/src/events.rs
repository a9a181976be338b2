//! Event types for the Coda event system
//!
//! Provides shared event definitions and the EventBus used by the judgment
//! core and any future Coda services. Events are broadcast in-process and can
//! be serialized for SSE transmission to the presentation layer.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Judgment producer type
///
/// Shared across event payloads, judgment keys, and progress counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RaterType {
    /// Asynchronous AI rater (batch or interactive)
    Ai,
    /// Synchronous human reviewer
    Human,
}

impl RaterType {
    /// Stable string form used in database columns and log fields
    pub fn as_str(&self) -> &'static str {
        match self {
            RaterType::Ai => "ai",
            RaterType::Human => "human",
        }
    }
}

impl std::str::FromStr for RaterType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ai" => Ok(RaterType::Ai),
            "human" => Ok(RaterType::Human),
            other => Err(crate::Error::InvalidInput(format!(
                "Unknown rater type: {}",
                other
            ))),
        }
    }
}

/// Coda event types
///
/// Events are broadcast via EventBus and can be serialized for SSE
/// transmission. All events use this central enum for type safety and
/// exhaustive matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CodaEvent {
    /// A judgment was persisted (insert or update)
    ///
    /// Triggers:
    /// - Progress Broadcaster: schedule a debounced count recomputation
    /// - SSE: refresh the judgment overlay for the visible subject
    JudgmentSaved {
        /// Subject the judgment applies to
        subject_id: Uuid,
        /// Producer that wrote the judgment
        rater_type: RaterType,
        /// Variable for excerpt-rating judgments, None for BWS tuples
        variable_id: Option<Uuid>,
        /// Whether this was a skip sentinel rather than a real choice
        skipped: bool,
        /// When the judgment was saved
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Rated/total counts for one rater, recomputed after a debounce interval
    ///
    /// Triggers:
    /// - SSE: update per-rater progress bars
    RatingProgress {
        /// Producer the counts belong to
        rater_type: RaterType,
        /// Subjects with at least one judgment from this rater
        rated_count: i64,
        /// Total subjects in the context
        total_count: i64,
        /// rated/total as 0.0-100.0
        percentage: f64,
        /// When counts were computed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// AI batch run accepted and queued
    BatchStarted {
        /// Subjects in the pending queue after exclusions
        queued: usize,
        /// Concurrent calls per batch
        batch_size: usize,
        /// When the run started
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// One batch member rated successfully
    BatchItemRated {
        /// Subject that was rated
        subject_id: Uuid,
        /// Variable for excerpt rating, None for BWS
        variable_id: Option<Uuid>,
        /// Round-trip latency of the rating call
        latency_ms: i64,
        /// When the result was persisted
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// One batch member failed; the batch continues
    BatchItemFailed {
        /// Subject whose rating call failed
        subject_id: Uuid,
        /// Variable for excerpt rating, None for BWS
        variable_id: Option<Uuid>,
        /// Error message from the rating call
        error: String,
        /// When the failure was recorded
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Pause requested; takes effect before the next batch
    BatchPaused {
        /// Queue position the run will resume from
        cursor: usize,
        /// When the pause was requested
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Paused run continuing from the stored cursor
    BatchResumed {
        /// Queue position the run resumes from
        cursor: usize,
        /// When the run resumed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Run stopped; queue, cursor, and locks cleared
    BatchStopped {
        /// Subjects rated before the stop
        rated: usize,
        /// When the run stopped
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Pending queue drained
    BatchCompleted {
        /// Subjects rated in this run
        rated: usize,
        /// Subjects that failed in this run
        failed: usize,
        /// Wall-clock duration of the run
        duration_seconds: u64,
        /// When the run completed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Interactive auto-rate dispatched for a subject opened without an AI judgment
    InteractiveRateStarted {
        /// Subject being rated
        subject_id: Uuid,
        /// When the call was dispatched
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Interactive auto-rate suppressed (batch running or key already in flight)
    ///
    /// Triggers:
    /// - SSE: show an "auto-rated shortly" notice instead of a spinner
    InteractiveRateSuppressed {
        /// Subject whose interactive rating was suppressed
        subject_id: Uuid,
        /// Why the trigger was suppressed
        reason: String,
        /// When the suppression happened
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Experiment reached full judgment coverage and was marked completed
    ExperimentCompleted {
        /// Experiment that completed
        experiment_id: Uuid,
        /// When the transition happened
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Scores computed for a context view
    ScoresComputed {
        /// Rater the scores are restricted to, None for the combined view
        rater_type: Option<RaterType>,
        /// Number of score entries returned
        count: usize,
        /// When scoring finished
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Scoring-service call failed (non-fatal, retryable from the results view)
    ScoringFailed {
        /// Rater the failed request was restricted to, None for combined
        rater_type: Option<RaterType>,
        /// Error message from the scoring service
        error: String,
        /// When the failure was recorded
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus
///
/// Uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
/// - Lagged message detection for slow subscribers
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CodaEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with the given channel capacity
    ///
    /// Events beyond the capacity displace the oldest buffered events for
    /// lagging subscribers.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<CodaEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists,
    /// `Err` if no subscribers are listening.
    pub fn emit(
        &self,
        event: CodaEvent,
    ) -> Result<usize, broadcast::error::SendError<CodaEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring whether anyone is listening
    ///
    /// Use for periodic/progress events where a missed event is harmless.
    pub fn emit_lossy(&self, event: CodaEvent) {
        let _ = self.tx.send(event);
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current number of subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
