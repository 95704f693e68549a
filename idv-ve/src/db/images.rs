//! Side-channel image archive
//!
//! Every non-null image payload produced or consumed by a verification
//! run is archived as its own timestamped record, written as one atomic
//! batch so a partial archive never persists.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use idv_common::Result;

/// Archive the given `(kind, payload)` pairs for a session in a single
/// transaction, skipping absent payloads. Returns the number of records
/// written.
pub async fn archive_images(
    pool: &SqlitePool,
    session_id: &str,
    entries: &[(&str, Option<&str>)],
    now: DateTime<Utc>,
) -> Result<usize> {
    let mut tx = pool.begin().await?;
    let mut written = 0;

    for (kind, payload) in entries {
        if let Some(base64) = payload {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO session_images (session_id, kind, base64, created_at)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(session_id)
            .bind(kind)
            .bind(base64)
            .bind(now.to_rfc3339())
            .execute(&mut *tx)
            .await?;
            written += 1;
        }
    }

    tx.commit().await?;
    Ok(written)
}

/// List archived image kinds for a session (diagnostics and tests).
pub async fn list_image_kinds(pool: &SqlitePool, session_id: &str) -> Result<Vec<String>> {
    let kinds: Vec<(String,)> =
        sqlx::query_as("SELECT kind FROM session_images WHERE session_id = ? ORDER BY kind")
            .bind(session_id)
            .fetch_all(pool)
            .await?;
    Ok(kinds.into_iter().map(|(k,)| k).collect())
}
