//! Batch rating engine integration tests: batch grouping, pause/resume,
//! stop, caching, per-subject failure isolation, and lock discipline shared
//! with the interactive path.

mod helpers;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use coda_common::events::{CodaEvent, EventBus, RaterType};
use coda_judge::db;
use coda_judge::models::Subject;
use coda_judge::services::{BatchState, InteractiveOutcome, RatingRubric};
use helpers::{CallRecord, MockRater};

/// Map each recorded call back to the fixture subject's queue position
fn call_positions(calls: &[CallRecord], subjects: &[Subject]) -> Vec<usize> {
    let by_first_item: HashMap<_, _> = subjects
        .iter()
        .map(|s| (s.item_ids[0], s.position as usize))
        .collect();
    calls
        .iter()
        .map(|call| by_first_item[&call.item_ids[0]])
        .collect()
}

/// Assert no two calls for the same subject overlap in time
fn assert_no_overlapping_calls(calls: &[CallRecord]) {
    for (i, a) in calls.iter().enumerate() {
        for b in calls.iter().skip(i + 1) {
            if a.item_ids == b.item_ids {
                let disjoint = a.ended <= b.started || b.ended <= a.started;
                assert!(disjoint, "overlapping rating calls for one subject");
            }
        }
    }
}

#[tokio::test]
async fn test_batches_dispatch_in_groups_of_batch_size() {
    let (_dir, pool) = helpers::setup_db().await;
    let event_bus = EventBus::new(64);
    let (experiment, subjects) = helpers::seed_experiment(&pool, 10, 3).await;

    let rater = Arc::new(MockRater::new(Duration::from_millis(30)));
    let (engine, _progress) = helpers::make_engine(&pool, &event_bus, rater.clone(), 3);

    let queued = engine
        .clone()
        .start(experiment.context())
        .await
        .expect("start batch");
    assert_eq!(queued, 10);

    helpers::wait_until(Duration::from_secs(10), || {
        engine.status().state == BatchState::Idle
    })
    .await;

    let mut calls = rater.recorded_calls();
    assert_eq!(calls.len(), 10, "every subject rated exactly once");

    // Batches dispatch as [0-2],[3-5],[6-8],[9]: sorted by start time, the
    // call groups are exactly those position sets
    calls.sort_by_key(|c| c.started);
    let positions = call_positions(&calls, &subjects);
    let groups: [&[usize]; 4] = [&positions[0..3], &positions[3..6], &positions[6..9], &positions[9..10]];
    let expected: [HashSet<usize>; 4] = [
        [0, 1, 2].into_iter().collect(),
        [3, 4, 5].into_iter().collect(),
        [6, 7, 8].into_iter().collect(),
        [9].into_iter().collect(),
    ];
    for (group, expected) in groups.iter().zip(expected.iter()) {
        let actual: HashSet<usize> = group.iter().copied().collect();
        assert_eq!(&actual, expected, "batch membership mismatch");
    }

    // A batch only dispatches after the previous one fully settles
    for boundary in [3, 6, 9] {
        let prev_end = calls[..boundary].iter().map(|c| c.ended).max().unwrap();
        let next_start = calls[boundary].started;
        assert!(
            next_start >= prev_end,
            "batch {} dispatched before batch {} settled",
            boundary / 3 + 1,
            boundary / 3
        );
    }

    let rated = db::judgments::count_rated(&pool, &experiment.context(), RaterType::Ai)
        .await
        .unwrap();
    assert_eq!(rated, 10);
    assert_eq!(engine.locks().in_flight(), 0, "all locks released");
}

#[tokio::test]
async fn test_pause_lets_current_batch_finish_then_resume_continues() {
    let (_dir, pool) = helpers::setup_db().await;
    let event_bus = EventBus::new(64);
    let (experiment, subjects) = helpers::seed_experiment(&pool, 10, 3).await;

    let (started_tx, mut started_rx) = tokio::sync::mpsc::unbounded_channel();
    let rater = Arc::new(
        MockRater::new(Duration::from_millis(60)).with_start_notifications(started_tx),
    );
    let (engine, _progress) = helpers::make_engine(&pool, &event_bus, rater.clone(), 3);

    engine
        .clone()
        .start(experiment.context())
        .await
        .expect("start batch");

    // Pause as soon as the fourth call (first member of batch 2) dispatches;
    // batch 2 members are still sleeping in the rater, so the flag lands
    // before the next batch decision
    while let Some(index) = started_rx.recv().await {
        if index >= 3 {
            engine.pause();
            break;
        }
    }

    helpers::wait_until(Duration::from_secs(10), || {
        engine.status().state == BatchState::Paused
    })
    .await;

    // Items 3-5 rated, item 6 never called
    let calls = rater.recorded_calls();
    assert_eq!(calls.len(), 6, "batches 1 and 2 settle, batch 3 never starts");
    let positions: HashSet<usize> = call_positions(&calls, &subjects).into_iter().collect();
    assert_eq!(positions, (0..6).collect::<HashSet<_>>());
    assert!(!positions.contains(&6), "item 6 must never be called");

    let rated = db::judgments::count_rated(&pool, &experiment.context(), RaterType::Ai)
        .await
        .unwrap();
    assert_eq!(rated, 6);
    assert_eq!(engine.status().cursor, 6, "cursor stored past batch 2");

    // Resume continues at the cursor without re-rating
    engine.clone().resume().expect("resume");
    helpers::wait_until(Duration::from_secs(10), || {
        engine.status().state == BatchState::Idle
    })
    .await;

    let calls = rater.recorded_calls();
    assert_eq!(calls.len(), 10, "resume never re-rates subjects 0-5");
    let all_positions = call_positions(&calls, &subjects);
    let unique: HashSet<usize> = all_positions.iter().copied().collect();
    assert_eq!(unique.len(), 10, "each subject called exactly once");
    assert_no_overlapping_calls(&calls);

    let rated = db::judgments::count_rated(&pool, &experiment.context(), RaterType::Ai)
        .await
        .unwrap();
    assert_eq!(rated, 10);
}

#[tokio::test]
async fn test_restart_skips_judged_subjects() {
    let (_dir, pool) = helpers::setup_db().await;
    let event_bus = EventBus::new(64);
    let (experiment, _subjects) = helpers::seed_experiment(&pool, 4, 3).await;

    let rater = Arc::new(MockRater::new(Duration::from_millis(5)));
    let (engine, _progress) = helpers::make_engine(&pool, &event_bus, rater.clone(), 2);

    engine
        .clone()
        .start(experiment.context())
        .await
        .expect("first run");
    helpers::wait_until(Duration::from_secs(10), || {
        engine.status().state == BatchState::Idle
    })
    .await;
    assert_eq!(rater.call_count(), 4);

    // Everything is judged (and cached): a second run queues nothing
    let queued = engine
        .clone()
        .start(experiment.context())
        .await
        .expect("second run");
    assert_eq!(queued, 0);
    helpers::wait_until(Duration::from_secs(10), || {
        engine.status().state == BatchState::Idle
    })
    .await;
    assert_eq!(rater.call_count(), 4, "a cache/store hit never re-issues a call");
}

#[tokio::test]
async fn test_per_subject_failure_does_not_abort_batch() {
    let (_dir, pool) = helpers::setup_db().await;
    let event_bus = EventBus::new(64);
    let mut rx = event_bus.subscribe();
    let (experiment, subjects) = helpers::seed_experiment(&pool, 5, 3).await;

    let rater = Arc::new(
        MockRater::new(Duration::from_millis(5)).failing_for([subjects[2].item_ids[0]]),
    );
    let (engine, _progress) = helpers::make_engine(&pool, &event_bus, rater.clone(), 2);

    engine
        .clone()
        .start(experiment.context())
        .await
        .expect("start batch");
    helpers::wait_until(Duration::from_secs(10), || {
        engine.status().state == BatchState::Idle
    })
    .await;

    assert_eq!(rater.call_count(), 5, "failure does not abort the batch");

    let rated = db::judgments::count_rated(&pool, &experiment.context(), RaterType::Ai)
        .await
        .unwrap();
    assert_eq!(rated, 4, "the failed subject is skipped, others persist");

    let status = engine.status();
    assert_eq!(status.rated, 4);
    assert_eq!(status.failed, 1);
    assert_eq!(engine.locks().in_flight(), 0, "failed call still releases its lock");

    // The failure surfaced as an event
    let mut saw_failure = false;
    while let Ok(event) = rx.try_recv() {
        if let CodaEvent::BatchItemFailed { subject_id, .. } = event {
            assert_eq!(subject_id, subjects[2].id);
            saw_failure = true;
        }
    }
    assert!(saw_failure, "BatchItemFailed event emitted");
}

#[tokio::test]
async fn test_stop_clears_queue_but_in_flight_calls_complete() {
    let (_dir, pool) = helpers::setup_db().await;
    let event_bus = EventBus::new(64);
    let (experiment, _subjects) = helpers::seed_experiment(&pool, 9, 3).await;

    let (started_tx, mut started_rx) = tokio::sync::mpsc::unbounded_channel();
    let rater = Arc::new(
        MockRater::new(Duration::from_millis(80)).with_start_notifications(started_tx),
    );
    let (engine, _progress) = helpers::make_engine(&pool, &event_bus, rater.clone(), 3);

    engine
        .clone()
        .start(experiment.context())
        .await
        .expect("start batch");

    // Stop once all three members of batch 1 are dispatched
    let mut dispatched = 0;
    while let Some(_) = started_rx.recv().await {
        dispatched += 1;
        if dispatched == 3 {
            engine.stop();
            break;
        }
    }

    helpers::wait_until(Duration::from_secs(10), || {
        engine.status().state == BatchState::Idle
    })
    .await;

    // The dispatched batch completed; nothing further started
    helpers::wait_until(Duration::from_secs(5), || rater.call_count() == 3).await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(rater.call_count(), 3, "stop prevents new batches");

    let status = engine.status();
    assert_eq!(status.queued, 0, "queue cleared");
    assert_eq!(status.cursor, 0, "cursor cleared");
    assert_eq!(engine.locks().in_flight(), 0, "locks cleared");
}

#[tokio::test]
async fn test_interactive_suppressed_while_batch_runs() {
    let (_dir, pool) = helpers::setup_db().await;
    let event_bus = EventBus::new(64);
    let mut rx = event_bus.subscribe();
    let (experiment, subjects) = helpers::seed_experiment(&pool, 6, 3).await;

    let rater = Arc::new(MockRater::new(Duration::from_millis(100)));
    let (engine, _progress) = helpers::make_engine(&pool, &event_bus, rater.clone(), 2);

    engine
        .clone()
        .start(experiment.context())
        .await
        .expect("start batch");
    assert!(engine.is_running());

    let rubric = RatingRubric::BestWorst {
        criterion: experiment.criterion.clone(),
    };
    let outcome = engine
        .rate_interactive(&subjects[5], rubric)
        .await
        .expect("interactive request");
    assert_eq!(outcome, InteractiveOutcome::Suppressed);

    let mut saw_notice = false;
    while let Ok(event) = rx.try_recv() {
        if let CodaEvent::InteractiveRateSuppressed { subject_id, .. } = event {
            assert_eq!(subject_id, subjects[5].id);
            saw_notice = true;
        }
    }
    assert!(saw_notice, "auto-rated-shortly notice emitted");

    helpers::wait_until(Duration::from_secs(10), || {
        engine.status().state == BatchState::Idle
    })
    .await;
}

#[tokio::test]
async fn test_interactive_rates_once_under_lock_when_idle() {
    let (_dir, pool) = helpers::setup_db().await;
    let event_bus = EventBus::new(64);
    let (experiment, subjects) = helpers::seed_experiment(&pool, 1, 3).await;
    let subject = &subjects[0];

    let rater = Arc::new(MockRater::new(Duration::from_millis(50)));
    let (engine, _progress) = helpers::make_engine(&pool, &event_bus, rater.clone(), 2);

    let rubric = || RatingRubric::BestWorst {
        criterion: experiment.criterion.clone(),
    };

    // Two concurrent interactive requests for the same key: exactly one call
    let (first, second) = tokio::join!(
        engine.rate_interactive(subject, rubric()),
        engine.rate_interactive(subject, rubric()),
    );
    let outcomes = [first.expect("first request"), second.expect("second request")];
    let rated = outcomes
        .iter()
        .filter(|o| **o == InteractiveOutcome::Rated)
        .count();
    assert_eq!(rated, 1, "exactly one request issues the call");
    assert_eq!(rater.call_count(), 1, "no duplicate concurrent work on one key");

    // A later request finds the judgment and stays silent
    let outcome = engine
        .rate_interactive(subject, rubric())
        .await
        .expect("third request");
    assert_eq!(outcome, InteractiveOutcome::AlreadyRated);
    assert_eq!(rater.call_count(), 1);

    let saved = db::judgments::get_any(&pool, subject.id, RaterType::Ai, None)
        .await
        .unwrap()
        .expect("AI judgment persisted");
    assert_eq!(saved.rater_id, "mock-ai");
    assert!(saved.latency_ms.unwrap_or(0) >= 50);
}
