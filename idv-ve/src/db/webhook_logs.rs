//! Webhook delivery log
//!
//! One immutable record per delivery attempt, success or failure. The log
//! is the only durable trace of outbound notifications; deliveries are
//! never retried.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use idv_common::Result;

/// Outcome of one delivery attempt
#[derive(Debug, Clone)]
pub enum DeliveryOutcome {
    /// Delivered; carries the HTTP status the sink responded with
    Success(u16),
    /// Not delivered; carries the error text
    Failed(String),
}

/// Append one delivery log record.
pub async fn log_delivery(
    pool: &SqlitePool,
    session_id: Option<&str>,
    event: &str,
    outcome: &DeliveryOutcome,
    now: DateTime<Utc>,
) -> Result<()> {
    let (status, response_status, error) = match outcome {
        DeliveryOutcome::Success(code) => ("success", Some(i64::from(*code)), None),
        DeliveryOutcome::Failed(message) => ("failed", None, Some(message.as_str())),
    };

    sqlx::query(
        r#"
        INSERT INTO webhook_logs (session_id, event, status, response_status, error, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(session_id)
    .bind(event)
    .bind(status)
    .bind(response_status)
    .bind(error)
    .bind(now.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Delivery log row, as read back for diagnostics and tests
#[derive(Debug, Clone)]
pub struct DeliveryLogEntry {
    pub session_id: Option<String>,
    pub event: String,
    pub status: String,
    pub response_status: Option<i64>,
    pub error: Option<String>,
}

/// List delivery records for a session, oldest first.
pub async fn list_deliveries(
    pool: &SqlitePool,
    session_id: &str,
) -> Result<Vec<DeliveryLogEntry>> {
    let rows = sqlx::query(
        r#"
        SELECT session_id, event, status, response_status, error
        FROM webhook_logs
        WHERE session_id = ?
        ORDER BY id
        "#,
    )
    .bind(session_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| DeliveryLogEntry {
            session_id: row.get("session_id"),
            event: row.get("event"),
            status: row.get("status"),
            response_status: row.get("response_status"),
            error: row.get("error"),
        })
        .collect())
}
