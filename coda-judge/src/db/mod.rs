//! Database access for coda-judge
//!
//! Shared SQLite database holding the subject catalog, judgment store, and
//! experiment/variable records.

pub mod experiments;
pub mod items;
pub mod judgments;
pub mod subjects;
pub mod variables;

use anyhow::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool
///
/// Connects to the shared coda.db, creating file and tables when missing.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // SQLite URI with mode=rwc (read, write, create)
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Initialize judgment-core tables
///
/// Creates the subject catalog, judgment store, and experiment/variable
/// tables if they don't exist.
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS items (
            guid TEXT PRIMARY KEY,
            content TEXT NOT NULL,
            source_ref TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS subjects (
            guid TEXT PRIMARY KEY,
            context_kind TEXT NOT NULL,
            context_id TEXT NOT NULL,
            variable_id TEXT NOT NULL DEFAULT '',
            position INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS subject_items (
            subject_id TEXT NOT NULL,
            item_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            PRIMARY KEY (subject_id, position)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS variables (
            guid TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            scale TEXT NOT NULL,
            anchors TEXT NOT NULL DEFAULT '[]',
            reasoning_depth TEXT NOT NULL DEFAULT '"brief"'
        )
        "#,
    )
    .execute(pool)
    .await?;

    // variable_id defaults to '' so the uniqueness constraint holds for BWS
    // judgments (SQLite treats NULLs as distinct in UNIQUE constraints)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS judgments (
            guid TEXT PRIMARY KEY,
            subject_id TEXT NOT NULL,
            rater_type TEXT NOT NULL,
            rater_id TEXT NOT NULL,
            variable_id TEXT NOT NULL DEFAULT '',
            outcome TEXT NOT NULL,
            reasoning TEXT,
            latency_ms INTEGER,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (subject_id, rater_type, rater_id, variable_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS experiments (
            guid TEXT PRIMARY KEY,
            status TEXT NOT NULL,
            criterion TEXT NOT NULL,
            tuple_size INTEGER NOT NULL,
            target_appearances INTEGER NOT NULL,
            design_method TEXT NOT NULL,
            scoring_method TEXT NOT NULL,
            required_raters TEXT NOT NULL DEFAULT '["human"]',
            scored_at TEXT,
            last_scoring_error TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (items, subjects, variables, judgments, experiments)");

    Ok(())
}
