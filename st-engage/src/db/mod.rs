//! SQLite fallback cache
//!
//! Holds the last-known like state per (subject, viewer) pair so a cold
//! start with an unreachable remote still shows something plausible. Read
//! once per subject at initialization, written on every state change, and
//! never treated as authoritative over a live server response.

pub mod interactions;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::info;

use st_common::Result;

/// Open (creating if needed) the cache database and ensure the schema
pub async fn open_cache(path: &Path) -> Result<Pool<Sqlite>> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await?;

    init_schema(&pool).await?;
    info!("Interaction cache opened at {}", path.display());
    Ok(pool)
}

/// In-memory cache database for tests
pub async fn open_memory_cache() -> Result<Pool<Sqlite>> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    init_schema(&pool).await?;
    Ok(pool)
}

/// Create the cache schema when missing
pub async fn init_schema(pool: &Pool<Sqlite>) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS interaction_cache (
            subject_id TEXT NOT NULL,
            viewer_id TEXT NOT NULL,
            is_liked INTEGER NOT NULL,
            likes_count INTEGER NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (subject_id, viewer_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
