//! Variable persistence

use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use coda_common::Result;

use crate::models::{ReasoningDepth, ScaleAnchor, Variable, VariableScale};

/// Persist a variable (variables are immutable after creation)
pub async fn save_variable(pool: &SqlitePool, variable: &Variable) -> Result<()> {
    let scale = serde_json::to_string(&variable.scale)
        .map_err(|e| coda_common::Error::Internal(format!("Failed to serialize scale: {}", e)))?;
    let anchors = serde_json::to_string(&variable.anchors)
        .map_err(|e| coda_common::Error::Internal(format!("Failed to serialize anchors: {}", e)))?;
    let reasoning_depth = serde_json::to_string(&variable.reasoning_depth).map_err(|e| {
        coda_common::Error::Internal(format!("Failed to serialize reasoning depth: {}", e))
    })?;

    sqlx::query(
        r#"
        INSERT INTO variables (guid, name, scale, anchors, reasoning_depth)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(guid) DO NOTHING
        "#,
    )
    .bind(variable.id.to_string())
    .bind(&variable.name)
    .bind(&scale)
    .bind(&anchors)
    .bind(&reasoning_depth)
    .execute(pool)
    .await?;

    Ok(())
}

/// Load a variable by id
pub async fn load_variable(pool: &SqlitePool, id: Uuid) -> Result<Option<Variable>> {
    let row = sqlx::query("SELECT guid, name, scale, anchors, reasoning_depth FROM variables WHERE guid = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let guid: String = row.get("guid");
    let id = Uuid::parse_str(&guid)
        .map_err(|e| coda_common::Error::Internal(format!("Bad variable id: {}", e)))?;

    let scale: String = row.get("scale");
    let scale: VariableScale = serde_json::from_str(&scale)
        .map_err(|e| coda_common::Error::Internal(format!("Failed to deserialize scale: {}", e)))?;

    let anchors: String = row.get("anchors");
    let anchors: Vec<ScaleAnchor> = serde_json::from_str(&anchors)
        .map_err(|e| coda_common::Error::Internal(format!("Failed to deserialize anchors: {}", e)))?;

    let reasoning_depth: String = row.get("reasoning_depth");
    let reasoning_depth: ReasoningDepth = serde_json::from_str(&reasoning_depth).map_err(|e| {
        coda_common::Error::Internal(format!("Failed to deserialize reasoning depth: {}", e))
    })?;

    Ok(Some(Variable {
        id,
        name: row.get("name"),
        scale,
        anchors,
        reasoning_depth,
    }))
}
