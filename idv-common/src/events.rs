//! Webhook event types
//!
//! Outbound notifications follow the session lifecycle. The payload shape
//! and event names are an external contract with webhook subscribers and
//! must not change.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

/// Session record created
pub const SESSION_CREATED: &str = "session.created";
/// Verification pipeline claimed the session and started recognition
pub const SESSION_PROCESSING_STARTED: &str = "session.processing.started";
/// Recognition finished; session is awaiting review
pub const SESSION_COMPLETED: &str = "session.completed";
/// Recognition failed; session reached its failure state
pub const SESSION_FAILED: &str = "session.failed";
/// Manually triggered delivery check
pub const WEBHOOK_TEST: &str = "webhook.test";

/// Outbound webhook notification payload.
///
/// Serialized exactly once per delivery; the HMAC signature is computed
/// over the serialized bytes, so field order here is part of the contract.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookEvent {
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Unix epoch milliseconds at payload construction time
    pub timestamp: i64,
    pub data: Value,
}

impl WebhookEvent {
    pub fn new(event: &str, session_id: Option<&str>, data: Value) -> Self {
        Self {
            event: event.to_string(),
            session_id: session_id.map(str::to_string),
            timestamp: Utc::now().timestamp_millis(),
            data,
        }
    }
}
