//! SQLite persistence for the verification engine
//!
//! The store is deliberately simple: single-record reads and writes on
//! `sessions`, one transactional batch for the image archive, and an
//! append-only webhook delivery log. Schema is created on startup.

pub mod images;
pub mod sessions;
pub mod webhook_logs;

use idv_common::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use tracing::info;

/// Open (creating if missing) the service database and ensure the schema.
pub async fn init_database_pool(path: &Path) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    create_schema(&pool).await?;
    info!(path = %path.display(), "database ready");
    Ok(pool)
}

/// In-memory database for tests and tooling.
///
/// Capped at one connection: every pooled connection to `sqlite::memory:`
/// would otherwise get its own private database.
pub async fn init_memory_pool() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    create_schema(&pool).await?;
    Ok(pool)
}

/// Create all tables if they do not exist.
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            session_id      TEXT PRIMARY KEY,
            status          TEXT NOT NULL,
            created_by      TEXT,
            session_url     TEXT,
            vendor_id       TEXT,
            id_image_front  TEXT,
            id_image_back   TEXT,
            face_image      TEXT,
            document_type   TEXT,
            document_number TEXT,
            personal_number TEXT,
            issuing_state   TEXT,
            first_name      TEXT,
            last_name       TEXT,
            date_of_birth   TEXT,
            document_valid  INTEGER,
            document_score  REAL,
            error_message   TEXT,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS session_images (
            session_id TEXT NOT NULL,
            kind       TEXT NOT NULL,
            base64     TEXT NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY (session_id, kind)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS webhook_logs (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id      TEXT,
            event           TEXT NOT NULL,
            status          TEXT NOT NULL,
            response_status INTEGER,
            error           TEXT,
            created_at      TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_database_is_created_on_first_open() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("idv-ve.db");

        let pool = init_database_pool(&path).await.expect("init pool");
        assert!(path.exists());

        // Schema creation is idempotent.
        create_schema(&pool).await.expect("re-create schema");
    }
}
