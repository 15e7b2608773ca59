//! Cached like-state rows
//!
//! Anonymous (viewer-less) state is stored under an empty viewer column so
//! it never collides with a real viewer's row.

use chrono::{DateTime, Utc};
use sqlx::{Pool, Row, Sqlite};
use uuid::Uuid;

use st_common::Result;

/// Last-known like state for one (subject, viewer) pair
#[derive(Debug, Clone, PartialEq)]
pub struct CachedInteraction {
    pub subject_id: Uuid,
    pub viewer_id: Option<Uuid>,
    pub is_liked: bool,
    pub likes_count: i64,
    pub updated_at: DateTime<Utc>,
}

fn viewer_column(viewer_id: Option<Uuid>) -> String {
    viewer_id.map(|v| v.to_string()).unwrap_or_default()
}

/// Load the cached row for a key, if any
pub async fn load(
    pool: &Pool<Sqlite>,
    subject_id: Uuid,
    viewer_id: Option<Uuid>,
) -> Result<Option<CachedInteraction>> {
    let row = sqlx::query(
        "SELECT is_liked, likes_count, updated_at FROM interaction_cache \
         WHERE subject_id = ? AND viewer_id = ?",
    )
    .bind(subject_id.to_string())
    .bind(viewer_column(viewer_id))
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| {
        let updated_at = row
            .get::<String, _>("updated_at")
            .parse::<DateTime<Utc>>()
            .unwrap_or_else(|_| Utc::now());
        CachedInteraction {
            subject_id,
            viewer_id,
            is_liked: row.get::<i64, _>("is_liked") != 0,
            likes_count: row.get("likes_count"),
            updated_at,
        }
    }))
}

/// Upsert the cached row for a key
pub async fn save(
    pool: &Pool<Sqlite>,
    subject_id: Uuid,
    viewer_id: Option<Uuid>,
    is_liked: bool,
    likes_count: i64,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO interaction_cache (subject_id, viewer_id, is_liked, likes_count, updated_at) \
         VALUES (?, ?, ?, ?, ?) \
         ON CONFLICT(subject_id, viewer_id) DO UPDATE SET \
             is_liked = excluded.is_liked, \
             likes_count = excluded.likes_count, \
             updated_at = excluded.updated_at",
    )
    .bind(subject_id.to_string())
    .bind(viewer_column(viewer_id))
    .bind(is_liked as i64)
    .bind(likes_count)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}
