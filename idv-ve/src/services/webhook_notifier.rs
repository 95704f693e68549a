//! Outbound webhook delivery
//!
//! Best-effort, fire-once notifications: sign the serialized payload with
//! HMAC-SHA256, POST it to the configured sink, and log the outcome.
//! Delivery failure is a boolean, never an error — the caller's own state
//! transitions must not depend on a subscriber being reachable.

use std::time::Duration;

use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use sha2::Sha256;
use sqlx::SqlitePool;
use tracing::{debug, warn};

use idv_common::config::SettingsHandle;
use idv_common::events::WebhookEvent;

use crate::db::webhook_logs::{self, DeliveryOutcome};

pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";
pub const EVENT_HEADER: &str = "X-Webhook-Event";

type HmacSha256 = Hmac<Sha256>;

/// Signed webhook notifier with delivery accounting.
pub struct WebhookNotifier {
    db: SqlitePool,
    settings: SettingsHandle,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(db: SqlitePool, settings: SettingsHandle) -> Self {
        Self {
            db,
            settings,
            client: reqwest::Client::new(),
        }
    }

    /// Hex-encoded HMAC-SHA256 over the exact payload bytes.
    pub fn sign(secret: &str, payload: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .expect("HMAC-SHA256 accepts keys of any length");
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }

    /// Deliver one signed notification.
    ///
    /// No-op (no HTTP call, no log record) when webhooks are disabled or
    /// the destination URL or shared secret is unset. Every actual attempt
    /// is logged, success or failure. Returns whether delivery succeeded.
    pub async fn send_notification(
        &self,
        session_id: Option<&str>,
        event: &str,
        data: Value,
    ) -> bool {
        let settings = self.settings.snapshot();
        if !settings.webhook_enabled
            || settings.webhook_url.is_empty()
            || settings.webhook_secret.is_empty()
        {
            debug!(event, "webhooks not configured or disabled");
            return false;
        }

        let payload = WebhookEvent::new(event, session_id, data);
        let body = match serde_json::to_vec(&payload) {
            Ok(body) => body,
            Err(e) => {
                warn!(event, error = %e, "failed to serialize webhook payload");
                return false;
            }
        };
        let signature = Self::sign(&settings.webhook_secret, &body);

        let attempt = self
            .client
            .post(&settings.webhook_url)
            .header(CONTENT_TYPE, "application/json")
            .header(SIGNATURE_HEADER, signature)
            .header(EVENT_HEADER, event)
            .body(body)
            .timeout(Duration::from_secs(settings.webhook_timeout_secs))
            .send()
            .await;

        let (delivered, outcome) = match attempt {
            Ok(response) if response.status().is_success() => {
                let code = response.status().as_u16();
                debug!(event, status = code, "webhook delivered");
                (true, DeliveryOutcome::Success(code))
            }
            Ok(response) => {
                let message = format!("webhook endpoint returned {}", response.status());
                warn!(event, error = %message, "webhook delivery failed");
                (false, DeliveryOutcome::Failed(message))
            }
            Err(e) => {
                warn!(event, error = %e, "webhook delivery failed");
                (false, DeliveryOutcome::Failed(e.to_string()))
            }
        };

        // The log is best-effort too; a log write failure must not bubble
        // into the orchestration outcome.
        if let Err(e) =
            webhook_logs::log_delivery(&self.db, session_id, event, &outcome, Utc::now()).await
        {
            warn!(event, error = %e, "failed to record webhook delivery");
        }

        delivered
    }
}
