//! Subject catalog operations
//!
//! Subjects are created by the external tuple-design/ingestion steps and are
//! read-only to the judgment core, which only enumerates and loads them.

use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use uuid::Uuid;

use coda_common::Result;

use crate::models::{RatingContext, Subject};

/// List all subjects for a context, ordered by position
pub async fn list_subjects(pool: &SqlitePool, context: &RatingContext) -> Result<Vec<Subject>> {
    let rows = sqlx::query(
        r#"
        SELECT guid, position
        FROM subjects
        WHERE context_kind = ? AND context_id = ? AND variable_id = ?
        ORDER BY position
        "#,
    )
    .bind(context.kind_str())
    .bind(context.id().to_string())
    .bind(context.variable_column())
    .fetch_all(pool)
    .await?;

    // One query for all item links, grouped in memory
    let link_rows = sqlx::query(
        r#"
        SELECT si.subject_id, si.item_id
        FROM subject_items si
        INNER JOIN subjects s ON s.guid = si.subject_id
        WHERE s.context_kind = ? AND s.context_id = ? AND s.variable_id = ?
        ORDER BY si.subject_id, si.position
        "#,
    )
    .bind(context.kind_str())
    .bind(context.id().to_string())
    .bind(context.variable_column())
    .fetch_all(pool)
    .await?;

    let mut items_by_subject: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for row in link_rows {
        let subject_id: String = row.get("subject_id");
        let item_id: String = row.get("item_id");
        let subject_id = parse_uuid(&subject_id)?;
        let item_id = parse_uuid(&item_id)?;
        items_by_subject.entry(subject_id).or_default().push(item_id);
    }

    let mut subjects = Vec::with_capacity(rows.len());
    for row in rows {
        let guid: String = row.get("guid");
        let id = parse_uuid(&guid)?;
        subjects.push(Subject {
            id,
            context: *context,
            item_ids: items_by_subject.remove(&id).unwrap_or_default(),
            position: row.get("position"),
        });
    }

    Ok(subjects)
}

/// Total subject count for a context
pub async fn count_subjects(pool: &SqlitePool, context: &RatingContext) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM subjects WHERE context_kind = ? AND context_id = ? AND variable_id = ?",
    )
    .bind(context.kind_str())
    .bind(context.id().to_string())
    .bind(context.variable_column())
    .fetch_one(pool)
    .await?;

    Ok(count)
}

/// Persist a subject and its ordered item links
///
/// Used by ingestion/tuple-design collaborators and test fixtures; the
/// judgment core itself never creates subjects.
pub async fn save_subject(pool: &SqlitePool, subject: &Subject) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO subjects (guid, context_kind, context_id, variable_id, position)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(guid) DO UPDATE SET position = excluded.position
        "#,
    )
    .bind(subject.id.to_string())
    .bind(subject.context.kind_str())
    .bind(subject.context.id().to_string())
    .bind(subject.context.variable_column())
    .bind(subject.position)
    .execute(pool)
    .await?;

    for (position, item_id) in subject.item_ids.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO subject_items (subject_id, item_id, position)
            VALUES (?, ?, ?)
            ON CONFLICT(subject_id, position) DO UPDATE SET item_id = excluded.item_id
            "#,
        )
        .bind(subject.id.to_string())
        .bind(item_id.to_string())
        .bind(position as i64)
        .execute(pool)
        .await?;
    }

    Ok(())
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| coda_common::Error::Internal(format!("Bad uuid {}: {}", s, e)))
}
