//! Session record persistence
//!
//! The `claim_for_processing` write doubles as the pipeline's mutual
//! exclusion gate: it is a conditional update that only succeeds while the
//! record is still in an eligible state, so exactly one of any number of
//! concurrent triggers wins the claim.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use idv_common::{Error, Result};

use crate::models::{Session, SessionStatus, VerificationResult};

/// Insert a freshly created session.
pub async fn insert_session(pool: &SqlitePool, session: &Session) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO sessions (
            session_id, status, created_by, session_url, vendor_id,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&session.session_id)
    .bind(session.status.as_str())
    .bind(&session.created_by)
    .bind(&session.session_url)
    .bind(&session.vendor_id)
    .bind(session.created_at.to_rfc3339())
    .bind(session.updated_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Load a session by id.
pub async fn load_session(pool: &SqlitePool, session_id: &str) -> Result<Option<Session>> {
    let row = sqlx::query("SELECT * FROM sessions WHERE session_id = ?")
        .bind(session_id)
        .fetch_optional(pool)
        .await?;

    row.map(|r| session_from_row(&r)).transpose()
}

/// Store submitted document images and advance a NOT_STARTED session to
/// IN_PROGRESS. Returns false when the session does not exist.
pub async fn submit_images(
    pool: &SqlitePool,
    session_id: &str,
    front: &str,
    back: Option<&str>,
    now: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE sessions
        SET id_image_front = ?,
            id_image_back = ?,
            status = CASE WHEN status = 'NOT_STARTED' THEN 'IN_PROGRESS' ELSE status END,
            updated_at = ?
        WHERE session_id = ?
        "#,
    )
    .bind(front)
    .bind(back)
    .bind(now.to_rfc3339())
    .bind(session_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Atomically claim an eligible session for processing.
///
/// Compare-and-set: the update succeeds only while status is still in the
/// eligible set and a front image is present. Returns false when another
/// trigger already claimed the record (or it was never eligible), which
/// the caller treats as a no-op.
pub async fn claim_for_processing(
    pool: &SqlitePool,
    session_id: &str,
    now: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE sessions
        SET status = 'PROCESSING_IMAGES', updated_at = ?
        WHERE session_id = ?
          AND status IN ('NOT_STARTED', 'IN_PROGRESS')
          AND id_image_front IS NOT NULL
          AND id_image_front != ''
        "#,
    )
    .bind(now.to_rfc3339())
    .bind(session_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Persist a successful verification result.
///
/// Writes the mapped result fields, moves the session to IN_REVIEW, sets
/// the face image from the portrait crop, and irrevocably clears the raw
/// front/back payloads: they are never needed again and must not remain
/// at rest.
pub async fn complete_session(
    pool: &SqlitePool,
    session_id: &str,
    result: &VerificationResult,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE sessions
        SET status = 'IN_REVIEW',
            document_type = ?,
            document_number = ?,
            personal_number = ?,
            issuing_state = ?,
            first_name = ?,
            last_name = ?,
            date_of_birth = ?,
            document_valid = ?,
            document_score = ?,
            vendor_id = COALESCE(?, vendor_id),
            face_image = ?,
            id_image_front = NULL,
            id_image_back = NULL,
            error_message = NULL,
            updated_at = ?
        WHERE session_id = ?
        "#,
    )
    .bind(&result.document_type)
    .bind(&result.document_number)
    .bind(&result.personal_number)
    .bind(&result.issuing_state)
    .bind(&result.first_name)
    .bind(&result.last_name)
    .bind(&result.date_of_birth)
    .bind(result.document_valid)
    .bind(result.document_score)
    .bind(&result.vendor_id)
    .bind(&result.images.portrait)
    .bind(now.to_rfc3339())
    .bind(session_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Record a terminal processing failure.
///
/// The raw image payloads are deliberately retained on this path so a
/// human can inspect and reprocess the session.
pub async fn fail_session(
    pool: &SqlitePool,
    session_id: &str,
    error_message: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE sessions
        SET status = 'PROCESSING_FAILED', error_message = ?, updated_at = ?
        WHERE session_id = ?
        "#,
    )
    .bind(error_message)
    .bind(now.to_rfc3339())
    .bind(session_id)
    .execute(pool)
    .await?;

    Ok(())
}

fn parse_timestamp(raw: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", field, e)))
}

fn session_from_row(row: &SqliteRow) -> Result<Session> {
    let status_raw: String = row.get("status");
    let status = SessionStatus::parse(&status_raw)
        .ok_or_else(|| Error::Internal(format!("Unknown session status: {}", status_raw)))?;

    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(Session {
        session_id: row.get("session_id"),
        status,
        created_by: row.get("created_by"),
        session_url: row.get("session_url"),
        vendor_id: row.get("vendor_id"),
        id_image_front: row.get("id_image_front"),
        id_image_back: row.get("id_image_back"),
        face_image: row.get("face_image"),
        document_type: row.get("document_type"),
        document_number: row.get("document_number"),
        personal_number: row.get("personal_number"),
        issuing_state: row.get("issuing_state"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        date_of_birth: row.get("date_of_birth"),
        document_valid: row.get("document_valid"),
        document_score: row.get("document_score"),
        error_message: row.get("error_message"),
        created_at: parse_timestamp(&created_at, "created_at")?,
        updated_at: parse_timestamp(&updated_at, "updated_at")?,
    })
}
