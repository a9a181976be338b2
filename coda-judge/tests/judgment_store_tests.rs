//! Judgment store integration tests: upsert semantics, key isolation, and
//! skip sentinels counting toward seen progress.

mod helpers;

use coda_common::events::RaterType;
use coda_judge::db;
use coda_judge::models::{Judgment, JudgmentOutcome};

#[tokio::test]
async fn test_repeated_save_updates_never_duplicates() {
    let (_dir, pool) = helpers::setup_db().await;
    let (_experiment, subjects) = helpers::seed_experiment(&pool, 1, 4).await;
    let subject = &subjects[0];

    let first = Judgment::new(
        subject.id,
        RaterType::Human,
        "local",
        None,
        JudgmentOutcome::Choice {
            best_item_id: subject.item_ids[0],
            worst_item_id: subject.item_ids[1],
        },
    );
    db::judgments::save(&pool, &first).await.unwrap();

    // Re-save the same key with a different choice
    let second = Judgment::new(
        subject.id,
        RaterType::Human,
        "local",
        None,
        JudgmentOutcome::Choice {
            best_item_id: subject.item_ids[2],
            worst_item_id: subject.item_ids[3],
        },
    );
    db::judgments::save(&pool, &second).await.unwrap();

    let row_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM judgments")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(row_count, 1, "re-save must update, never duplicate");

    let loaded = db::judgments::get(&pool, subject.id, RaterType::Human, "local", None)
        .await
        .unwrap()
        .expect("judgment exists");
    assert_eq!(loaded.outcome, second.outcome);
}

#[tokio::test]
async fn test_rater_keys_are_independent() {
    let (_dir, pool) = helpers::setup_db().await;
    let (_experiment, subjects) = helpers::seed_experiment(&pool, 1, 3).await;
    let subject = &subjects[0];

    let human = Judgment::new(
        subject.id,
        RaterType::Human,
        "local",
        None,
        JudgmentOutcome::Choice {
            best_item_id: subject.item_ids[0],
            worst_item_id: subject.item_ids[1],
        },
    );
    let ai = Judgment::new(
        subject.id,
        RaterType::Ai,
        "mock-ai",
        None,
        JudgmentOutcome::Choice {
            best_item_id: subject.item_ids[1],
            worst_item_id: subject.item_ids[2],
        },
    );
    db::judgments::save(&pool, &human).await.unwrap();
    db::judgments::save(&pool, &ai).await.unwrap();

    let row_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM judgments")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(row_count, 2, "different rater types are different keys");

    // Overlays resolve independently
    let human_loaded = db::judgments::get(&pool, subject.id, RaterType::Human, "local", None)
        .await
        .unwrap()
        .unwrap();
    let ai_loaded = db::judgments::get_any(&pool, subject.id, RaterType::Ai, None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(human_loaded.outcome, human.outcome);
    assert_eq!(ai_loaded.outcome, ai.outcome);
    assert_eq!(ai_loaded.rater_id, "mock-ai");
}

#[tokio::test]
async fn test_skip_sentinel_counts_toward_seen_progress() {
    let (_dir, pool) = helpers::setup_db().await;
    let (experiment, subjects) = helpers::seed_experiment(&pool, 3, 3).await;
    let context = experiment.context();

    let skip = Judgment::new(
        subjects[0].id,
        RaterType::Human,
        "local",
        None,
        JudgmentOutcome::Skipped,
    );
    db::judgments::save(&pool, &skip).await.unwrap();

    let loaded = db::judgments::get(&pool, subjects[0].id, RaterType::Human, "local", None)
        .await
        .unwrap()
        .unwrap();
    assert!(loaded.outcome.is_skip());

    // A skip is "seen": it counts as rated and removes the subject from the
    // unrated view
    let rated = db::judgments::count_rated(&pool, &context, RaterType::Human)
        .await
        .unwrap();
    assert_eq!(rated, 1);

    let judged = db::judgments::judged_subject_ids(&pool, &context, RaterType::Human)
        .await
        .unwrap();
    assert!(judged.contains(&subjects[0].id));
}

#[tokio::test]
async fn test_list_by_rater_scoped_to_context() {
    let (_dir, pool) = helpers::setup_db().await;
    let (experiment_a, subjects_a) = helpers::seed_experiment(&pool, 2, 3).await;
    let (experiment_b, subjects_b) = helpers::seed_experiment(&pool, 2, 3).await;

    for subject in subjects_a.iter().chain(subjects_b.iter()) {
        let judgment = Judgment::new(
            subject.id,
            RaterType::Human,
            "local",
            None,
            JudgmentOutcome::Skipped,
        );
        db::judgments::save(&pool, &judgment).await.unwrap();
    }

    let listed_a = db::judgments::list_by_rater(&pool, &experiment_a.context(), RaterType::Human)
        .await
        .unwrap();
    assert_eq!(listed_a.len(), 2);
    for judgment in &listed_a {
        assert!(subjects_a.iter().any(|s| s.id == judgment.subject_id));
    }

    let listed_b = db::judgments::list_by_rater(&pool, &experiment_b.context(), RaterType::Human)
        .await
        .unwrap();
    assert_eq!(listed_b.len(), 2);

    // No AI judgments anywhere
    let ai = db::judgments::list_by_rater(&pool, &experiment_a.context(), RaterType::Ai)
        .await
        .unwrap();
    assert!(ai.is_empty());
}

#[tokio::test]
async fn test_excerpt_judgments_keyed_by_variable() {
    let (_dir, pool) = helpers::setup_db().await;
    let (context, variable, subjects) = helpers::seed_collection(&pool, 1).await;
    let subject = &subjects[0];

    let judgment = Judgment::new(
        subject.id,
        RaterType::Human,
        "local",
        Some(variable.id),
        JudgmentOutcome::Score { value: 4.0 },
    );
    db::judgments::save(&pool, &judgment).await.unwrap();

    // The BWS key (no variable) stays empty
    let bws = db::judgments::get(&pool, subject.id, RaterType::Human, "local", None)
        .await
        .unwrap();
    assert!(bws.is_none());

    let scored = db::judgments::get(
        &pool,
        subject.id,
        RaterType::Human,
        "local",
        Some(variable.id),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(scored.outcome, JudgmentOutcome::Score { value: 4.0 });
    assert_eq!(scored.variable_id, Some(variable.id));

    let rated = db::judgments::count_rated(&pool, &context, RaterType::Human)
        .await
        .unwrap();
    assert_eq!(rated, 1);
}
