//! Judgment store operations
//!
//! Judgments are keyed by (subject, rater_type, rater_id, variable); saves
//! upsert so at most one row ever exists per key. A `None` variable is stored
//! as '' to keep the uniqueness constraint effective for BWS judgments.

use sqlx::{Row, SqlitePool};
use std::collections::HashSet;
use uuid::Uuid;

use coda_common::events::RaterType;
use coda_common::Result;

use crate::models::{Judgment, JudgmentOutcome, RatingContext};

fn variable_column(variable_id: Option<Uuid>) -> String {
    variable_id.map(|v| v.to_string()).unwrap_or_default()
}

/// Save a judgment, updating in place when the key already exists
pub async fn save(pool: &SqlitePool, judgment: &Judgment) -> Result<()> {
    let outcome = serde_json::to_string(&judgment.outcome)
        .map_err(|e| coda_common::Error::Internal(format!("Failed to serialize outcome: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO judgments (
            guid, subject_id, rater_type, rater_id, variable_id,
            outcome, reasoning, latency_ms, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(subject_id, rater_type, rater_id, variable_id) DO UPDATE SET
            outcome = excluded.outcome,
            reasoning = excluded.reasoning,
            latency_ms = excluded.latency_ms,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(judgment.subject_id.to_string())
    .bind(judgment.rater_type.as_str())
    .bind(&judgment.rater_id)
    .bind(variable_column(judgment.variable_id))
    .bind(&outcome)
    .bind(&judgment.reasoning)
    .bind(judgment.latency_ms)
    .bind(judgment.created_at.to_rfc3339())
    .bind(judgment.updated_at.to_rfc3339())
    .execute(pool)
    .await?;

    tracing::debug!(
        subject_id = %judgment.subject_id,
        rater_type = judgment.rater_type.as_str(),
        rater_id = %judgment.rater_id,
        skipped = judgment.outcome.is_skip(),
        "Judgment saved"
    );

    Ok(())
}

/// Load the judgment for an exact key
pub async fn get(
    pool: &SqlitePool,
    subject_id: Uuid,
    rater_type: RaterType,
    rater_id: &str,
    variable_id: Option<Uuid>,
) -> Result<Option<Judgment>> {
    let row = sqlx::query(
        r#"
        SELECT subject_id, rater_type, rater_id, variable_id,
               outcome, reasoning, latency_ms, created_at, updated_at
        FROM judgments
        WHERE subject_id = ? AND rater_type = ? AND rater_id = ? AND variable_id = ?
        "#,
    )
    .bind(subject_id.to_string())
    .bind(rater_type.as_str())
    .bind(rater_id)
    .bind(variable_column(variable_id))
    .fetch_optional(pool)
    .await?;

    row.map(parse_row).transpose()
}

/// Load any judgment from a rater type, regardless of rater id
///
/// Used for display overlays where the AI rater id is irrelevant.
pub async fn get_any(
    pool: &SqlitePool,
    subject_id: Uuid,
    rater_type: RaterType,
    variable_id: Option<Uuid>,
) -> Result<Option<Judgment>> {
    let row = sqlx::query(
        r#"
        SELECT subject_id, rater_type, rater_id, variable_id,
               outcome, reasoning, latency_ms, created_at, updated_at
        FROM judgments
        WHERE subject_id = ? AND rater_type = ? AND variable_id = ?
        ORDER BY updated_at DESC
        LIMIT 1
        "#,
    )
    .bind(subject_id.to_string())
    .bind(rater_type.as_str())
    .bind(variable_column(variable_id))
    .fetch_optional(pool)
    .await?;

    row.map(parse_row).transpose()
}

/// List every judgment a rater type produced for a context
pub async fn list_by_rater(
    pool: &SqlitePool,
    context: &RatingContext,
    rater_type: RaterType,
) -> Result<Vec<Judgment>> {
    let rows = sqlx::query(
        r#"
        SELECT j.subject_id, j.rater_type, j.rater_id, j.variable_id,
               j.outcome, j.reasoning, j.latency_ms, j.created_at, j.updated_at
        FROM judgments j
        INNER JOIN subjects s ON s.guid = j.subject_id
        WHERE s.context_kind = ? AND s.context_id = ? AND s.variable_id = ?
          AND j.rater_type = ?
        ORDER BY s.position
        "#,
    )
    .bind(context.kind_str())
    .bind(context.id().to_string())
    .bind(context.variable_column())
    .bind(rater_type.as_str())
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(parse_row).collect()
}

/// Subject ids a rater type has judged within a context
pub async fn judged_subject_ids(
    pool: &SqlitePool,
    context: &RatingContext,
    rater_type: RaterType,
) -> Result<HashSet<Uuid>> {
    let rows = sqlx::query_scalar::<_, String>(
        r#"
        SELECT DISTINCT j.subject_id
        FROM judgments j
        INNER JOIN subjects s ON s.guid = j.subject_id
        WHERE s.context_kind = ? AND s.context_id = ? AND s.variable_id = ?
          AND j.rater_type = ?
        "#,
    )
    .bind(context.kind_str())
    .bind(context.id().to_string())
    .bind(context.variable_column())
    .bind(rater_type.as_str())
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|s| {
            Uuid::parse_str(&s)
                .map_err(|e| coda_common::Error::Internal(format!("Bad subject id {}: {}", s, e)))
        })
        .collect()
}

/// Count of subjects a rater type has judged within a context
///
/// A count query only; never loads judgment payloads.
pub async fn count_rated(
    pool: &SqlitePool,
    context: &RatingContext,
    rater_type: RaterType,
) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(DISTINCT j.subject_id)
        FROM judgments j
        INNER JOIN subjects s ON s.guid = j.subject_id
        WHERE s.context_kind = ? AND s.context_id = ? AND s.variable_id = ?
          AND j.rater_type = ?
        "#,
    )
    .bind(context.kind_str())
    .bind(context.id().to_string())
    .bind(context.variable_column())
    .bind(rater_type.as_str())
    .fetch_one(pool)
    .await?;

    Ok(count)
}

fn parse_row(row: sqlx::sqlite::SqliteRow) -> Result<Judgment> {
    let subject_id: String = row.get("subject_id");
    let subject_id = Uuid::parse_str(&subject_id)
        .map_err(|e| coda_common::Error::Internal(format!("Bad subject id: {}", e)))?;

    let rater_type: String = row.get("rater_type");
    let rater_type: RaterType = rater_type.parse()?;

    let variable_id: String = row.get("variable_id");
    let variable_id = if variable_id.is_empty() {
        None
    } else {
        Some(
            Uuid::parse_str(&variable_id)
                .map_err(|e| coda_common::Error::Internal(format!("Bad variable id: {}", e)))?,
        )
    };

    let outcome: String = row.get("outcome");
    let outcome: JudgmentOutcome = serde_json::from_str(&outcome)
        .map_err(|e| coda_common::Error::Internal(format!("Failed to deserialize outcome: {}", e)))?;

    let created_at: String = row.get("created_at");
    let created_at = chrono::DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| coda_common::Error::Internal(format!("Failed to parse created_at: {}", e)))?
        .with_timezone(&chrono::Utc);

    let updated_at: String = row.get("updated_at");
    let updated_at = chrono::DateTime::parse_from_rfc3339(&updated_at)
        .map_err(|e| coda_common::Error::Internal(format!("Failed to parse updated_at: {}", e)))?
        .with_timezone(&chrono::Utc);

    Ok(Judgment {
        subject_id,
        rater_type,
        rater_id: row.get("rater_id"),
        variable_id,
        outcome,
        reasoning: row.get("reasoning"),
        latency_ms: row.get("latency_ms"),
        created_at,
        updated_at,
    })
}
