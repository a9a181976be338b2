//! Experiment persistence

use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use coda_common::events::RaterType;
use coda_common::Result;

use crate::models::{Experiment, ExperimentStatus};

/// Save an experiment, updating mutable fields when it already exists
pub async fn save_experiment(pool: &SqlitePool, experiment: &Experiment) -> Result<()> {
    let required_raters = serde_json::to_string(&experiment.required_raters).map_err(|e| {
        coda_common::Error::Internal(format!("Failed to serialize required raters: {}", e))
    })?;

    sqlx::query(
        r#"
        INSERT INTO experiments (
            guid, status, criterion, tuple_size, target_appearances,
            design_method, scoring_method, required_raters,
            scored_at, last_scoring_error, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(guid) DO UPDATE SET
            status = excluded.status,
            scored_at = excluded.scored_at,
            last_scoring_error = excluded.last_scoring_error,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(experiment.id.to_string())
    .bind(experiment.status.as_str())
    .bind(&experiment.criterion)
    .bind(experiment.tuple_size)
    .bind(experiment.target_appearances)
    .bind(&experiment.design_method)
    .bind(&experiment.scoring_method)
    .bind(&required_raters)
    .bind(experiment.scored_at.map(|dt| dt.to_rfc3339()))
    .bind(&experiment.last_scoring_error)
    .bind(experiment.created_at.to_rfc3339())
    .bind(experiment.updated_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Load an experiment by id
pub async fn load_experiment(pool: &SqlitePool, id: Uuid) -> Result<Option<Experiment>> {
    let row = sqlx::query(
        r#"
        SELECT guid, status, criterion, tuple_size, target_appearances,
               design_method, scoring_method, required_raters,
               scored_at, last_scoring_error, created_at, updated_at
        FROM experiments
        WHERE guid = ?
        "#,
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let guid: String = row.get("guid");
    let id = Uuid::parse_str(&guid)
        .map_err(|e| coda_common::Error::Internal(format!("Bad experiment id: {}", e)))?;

    let status: String = row.get("status");
    let status: ExperimentStatus = status.parse()?;

    let required_raters: String = row.get("required_raters");
    let required_raters: Vec<RaterType> = serde_json::from_str(&required_raters).map_err(|e| {
        coda_common::Error::Internal(format!("Failed to deserialize required raters: {}", e))
    })?;

    let created_at = parse_rfc3339(row.get("created_at"))?;
    let updated_at = parse_rfc3339(row.get("updated_at"))?;
    let scored_at: Option<String> = row.get("scored_at");
    let scored_at = scored_at.map(parse_rfc3339).transpose()?;

    Ok(Some(Experiment {
        id,
        status,
        criterion: row.get("criterion"),
        tuple_size: row.get("tuple_size"),
        target_appearances: row.get("target_appearances"),
        design_method: row.get("design_method"),
        scoring_method: row.get("scoring_method"),
        required_raters,
        scored_at,
        last_scoring_error: row.get("last_scoring_error"),
        created_at,
        updated_at,
    }))
}

/// Update only the lifecycle status
pub async fn update_status(pool: &SqlitePool, id: Uuid, status: ExperimentStatus) -> Result<()> {
    let result = sqlx::query("UPDATE experiments SET status = ?, updated_at = ? WHERE guid = ?")
        .bind(status.as_str())
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(coda_common::Error::NotFound(format!(
            "Experiment not found: {}",
            id
        )));
    }

    tracing::info!(experiment_id = %id, status = status.as_str(), "Experiment status updated");

    Ok(())
}

/// Record the outcome of a scoring attempt on the experiment row
pub async fn record_scoring_result(
    pool: &SqlitePool,
    id: Uuid,
    error: Option<&str>,
) -> Result<()> {
    let now = chrono::Utc::now().to_rfc3339();
    match error {
        None => {
            sqlx::query(
                "UPDATE experiments SET scored_at = ?, last_scoring_error = NULL, updated_at = ? WHERE guid = ?",
            )
            .bind(&now)
            .bind(&now)
            .bind(id.to_string())
            .execute(pool)
            .await?;
        }
        Some(message) => {
            sqlx::query(
                "UPDATE experiments SET last_scoring_error = ?, updated_at = ? WHERE guid = ?",
            )
            .bind(message)
            .bind(&now)
            .bind(id.to_string())
            .execute(pool)
            .await?;
        }
    }

    Ok(())
}

fn parse_rfc3339(s: String) -> Result<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|e| coda_common::Error::Internal(format!("Failed to parse timestamp: {}", e)))
}
