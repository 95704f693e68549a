//! Webhook delivery check endpoint

use axum::{extract::State, routing::post, Json, Router};
use serde::Serialize;
use serde_json::json;

use idv_common::events;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct WebhookTestResponse {
    pub delivered: bool,
}

/// POST /webhook/test
///
/// Sends a signed `webhook.test` event to the configured sink so an
/// operator can verify the subscription end to end.
pub async fn test_webhook(State(state): State<AppState>) -> Json<WebhookTestResponse> {
    let delivered = state
        .notifier
        .send_notification(
            None,
            events::WEBHOOK_TEST,
            json!({ "message": "Webhook configuration test" }),
        )
        .await;

    Json(WebhookTestResponse { delivered })
}

pub fn webhook_routes() -> Router<AppState> {
    Router::new().route("/webhook/test", post(test_webhook))
}
