//! Progress broadcasting
//!
//! Computes rated/total counts per rater for a context using count queries
//! only, never full judgment loads. Recomputation is debounced so rapid batch
//! activity does not trigger a storm of count queries; counts may therefore
//! lag persisted state by up to one debounce interval.

use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use coda_common::events::{CodaEvent, EventBus, RaterType};

use crate::db;
use crate::models::RatingContext;

/// Rated/total counts for one rater
#[derive(Debug, Clone, Serialize)]
pub struct ProgressCounts {
    pub rater_type: RaterType,
    pub rated_count: i64,
    pub total_count: i64,
    pub percentage: f64,
}

/// Compute current counts for both rater types
pub async fn compute_counts(
    pool: &SqlitePool,
    context: &RatingContext,
) -> coda_common::Result<Vec<ProgressCounts>> {
    let total_count = db::subjects::count_subjects(pool, context).await?;

    let mut counts = Vec::with_capacity(2);
    for rater_type in [RaterType::Ai, RaterType::Human] {
        let rated_count = db::judgments::count_rated(pool, context, rater_type).await?;
        let percentage = if total_count > 0 {
            (rated_count as f64 / total_count as f64) * 100.0
        } else {
            0.0
        };
        counts.push(ProgressCounts {
            rater_type,
            rated_count,
            total_count,
            percentage,
        });
    }

    Ok(counts)
}

/// Cheap handle judgment writers use to schedule a recount
#[derive(Clone)]
pub struct ProgressNotifier {
    tx: mpsc::Sender<()>,
}

impl ProgressNotifier {
    /// Schedule a debounced recomputation; coalesces with pending marks
    pub fn mark_dirty(&self) {
        // A full channel already has a recount pending
        let _ = self.tx.try_send(());
    }
}

/// Debounced progress recomputation task
///
/// Owns a background task emitting `RatingProgress` events after judgment
/// saves; `shutdown()` tears it down on session close.
pub struct ProgressBroadcaster {
    notifier: ProgressNotifier,
    context: Arc<Mutex<Option<RatingContext>>>,
    cancel: CancellationToken,
}

impl ProgressBroadcaster {
    /// Start the broadcaster task
    pub fn spawn(db: SqlitePool, event_bus: EventBus, debounce: Duration) -> Self {
        let (tx, rx) = mpsc::channel(8);
        let context = Arc::new(Mutex::new(None));
        let cancel = CancellationToken::new();

        tokio::spawn(run(
            db,
            event_bus,
            rx,
            debounce,
            Arc::clone(&context),
            cancel.clone(),
        ));

        Self {
            notifier: ProgressNotifier { tx },
            context,
            cancel,
        }
    }

    /// Handle for judgment writers
    pub fn notifier(&self) -> ProgressNotifier {
        self.notifier.clone()
    }

    /// Point the broadcaster at a context (session open / batch start)
    pub fn set_context(&self, context: Option<RatingContext>) {
        *self.context.lock().expect("progress context poisoned") = context;
    }

    /// Schedule a debounced recomputation
    pub fn mark_dirty(&self) {
        self.notifier.mark_dirty();
    }

    /// Stop the background task (session teardown)
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for ProgressBroadcaster {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run(
    db: SqlitePool,
    event_bus: EventBus,
    mut rx: mpsc::Receiver<()>,
    debounce: Duration,
    context: Arc<Mutex<Option<RatingContext>>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = rx.recv() => {
                if received.is_none() {
                    break;
                }
            }
        }

        // Debounce window: further marks within it coalesce into one recount
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(debounce) => {}
        }
        while rx.try_recv().is_ok() {}

        let current = *context.lock().expect("progress context poisoned");
        let Some(current) = current else {
            continue;
        };

        match compute_counts(&db, &current).await {
            Ok(counts) => {
                for count in counts {
                    debug!(
                        rater_type = count.rater_type.as_str(),
                        rated = count.rated_count,
                        total = count.total_count,
                        "Progress recomputed"
                    );
                    event_bus.emit_lossy(CodaEvent::RatingProgress {
                        rater_type: count.rater_type,
                        rated_count: count.rated_count,
                        total_count: count.total_count,
                        percentage: count.percentage,
                        timestamp: chrono::Utc::now(),
                    });
                }
            }
            Err(e) => {
                warn!(error = %e, "Progress recomputation failed");
            }
        }
    }

    debug!("Progress broadcaster task stopped");
}
