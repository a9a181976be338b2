//! Item content access (read-only to the judgment core)

use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use uuid::Uuid;

use coda_common::Result;

use crate::models::Item;

/// Load items by id, preserving the requested order
pub async fn load_items(pool: &SqlitePool, item_ids: &[Uuid]) -> Result<Vec<Item>> {
    let mut by_id: HashMap<Uuid, Item> = HashMap::with_capacity(item_ids.len());

    for item_id in item_ids {
        let row = sqlx::query("SELECT guid, content, source_ref FROM items WHERE guid = ?")
            .bind(item_id.to_string())
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| coda_common::Error::NotFound(format!("Item not found: {}", item_id)))?;

        let guid: String = row.get("guid");
        let id = Uuid::parse_str(&guid)
            .map_err(|e| coda_common::Error::Internal(format!("Bad item id: {}", e)))?;
        by_id.insert(
            id,
            Item {
                id,
                content: row.get("content"),
                source_ref: row.get("source_ref"),
            },
        );
    }

    Ok(item_ids
        .iter()
        .filter_map(|id| by_id.remove(id))
        .collect())
}

/// Persist an item (ingestion collaborators and test fixtures)
pub async fn save_item(pool: &SqlitePool, item: &Item) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO items (guid, content, source_ref)
        VALUES (?, ?, ?)
        ON CONFLICT(guid) DO UPDATE SET
            content = excluded.content,
            source_ref = excluded.source_ref
        "#,
    )
    .bind(item.id.to_string())
    .bind(&item.content)
    .bind(&item.source_ref)
    .execute(pool)
    .await?;

    Ok(())
}
