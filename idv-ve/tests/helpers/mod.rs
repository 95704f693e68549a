//! Shared test infrastructure
//!
//! Local axum servers standing in for the recognition backend and the
//! webhook sink, plus fixtures wiring the service graph over an
//! in-memory database.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use sqlx::SqlitePool;

use idv_common::config::{Settings, SettingsHandle};
use idv_ve::services::recognition_client::RecognitionClient;
use idv_ve::services::session_orchestrator::SessionOrchestrator;
use idv_ve::services::webhook_notifier::WebhookNotifier;

/// Mock recognition backend recording every call path it serves.
#[derive(Clone)]
pub struct MockBackend {
    pub base_url: String,
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl MockBackend {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }
}

/// Spawn a backend that accepts any submission and answers every stream
/// request with the given event-stream body.
pub async fn spawn_recognition_backend(sse_body: &str) -> MockBackend {
    #[derive(Clone)]
    struct BackendState {
        body: Arc<String>,
        calls: Arc<Mutex<Vec<String>>>,
    }

    async fn submit(
        State(state): State<BackendState>,
        Path(endpoint): Path<String>,
    ) -> Json<serde_json::Value> {
        state
            .calls
            .lock()
            .expect("calls lock")
            .push(format!("POST /{}", endpoint));
        Json(json!({ "event_id": "evt-test" }))
    }

    async fn stream(
        State(state): State<BackendState>,
        Path((endpoint, event_id)): Path<(String, String)>,
    ) -> impl IntoResponse {
        state
            .calls
            .lock()
            .expect("calls lock")
            .push(format!("GET /{}/{}", endpoint, event_id));
        (
            [(header::CONTENT_TYPE, "text/event-stream")],
            (*state.body).clone(),
        )
    }

    let state = BackendState {
        body: Arc::new(sse_body.to_string()),
        calls: Arc::new(Mutex::new(Vec::new())),
    };
    let calls = state.calls.clone();

    let app = Router::new()
        .route("/gradio_api/call/:endpoint", post(submit))
        .route("/gradio_api/call/:endpoint/:event_id", get(stream))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind backend");
    let addr = listener.local_addr().expect("backend addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve backend");
    });

    MockBackend {
        base_url: format!("http://{}", addr),
        calls,
    }
}

/// One notification captured by the webhook sink
#[derive(Debug, Clone)]
pub struct ReceivedHook {
    pub event: Option<String>,
    pub signature: Option<String>,
    pub body: Vec<u8>,
}

/// Spawn a webhook sink answering with the given status and capturing
/// every delivery.
pub async fn spawn_webhook_sink(
    respond_with: StatusCode,
) -> (String, Arc<Mutex<Vec<ReceivedHook>>>) {
    type SinkState = (Arc<Mutex<Vec<ReceivedHook>>>, StatusCode);

    async fn receive(
        State((store, status)): State<SinkState>,
        headers: HeaderMap,
        body: Bytes,
    ) -> StatusCode {
        let header_str = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        store.lock().expect("sink lock").push(ReceivedHook {
            event: header_str("X-Webhook-Event"),
            signature: header_str("X-Webhook-Signature"),
            body: body.to_vec(),
        });
        status
    }

    let store: Arc<Mutex<Vec<ReceivedHook>>> = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/hook", post(receive))
        .with_state((store.clone(), respond_with));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind sink");
    let addr = listener.local_addr().expect("sink addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve sink");
    });

    (format!("http://{}/hook", addr), store)
}

/// Settings snapshot pointed at the mock servers. No poll delay so the
/// biometric flows run instantly.
pub fn test_settings(backend_url: &str, webhook: Option<(&str, &str)>) -> Settings {
    Settings {
        server_url: backend_url.to_string(),
        document_liveness_server_url: backend_url.to_string(),
        access_token: "test-token".to_string(),
        session_site_url: "https://verify.test".to_string(),
        api_keys: vec!["test-key".to_string()],
        webhook_enabled: webhook.is_some(),
        webhook_url: webhook.map(|(url, _)| url.to_string()).unwrap_or_default(),
        webhook_secret: webhook
            .map(|(_, secret)| secret.to_string())
            .unwrap_or_default(),
        stream_timeout_secs: 5,
        poll_delay_secs: 0,
        webhook_timeout_secs: 5,
        ..Settings::default()
    }
}

/// Wire the verification service graph over the given pool and settings.
pub fn verification_stack(
    pool: &SqlitePool,
    settings: Settings,
) -> (Arc<SessionOrchestrator>, Arc<WebhookNotifier>) {
    let handle = SettingsHandle::fixed(settings);
    let recognition = Arc::new(RecognitionClient::new(handle.clone()));
    let notifier = Arc::new(WebhookNotifier::new(pool.clone(), handle));
    let orchestrator = Arc::new(SessionOrchestrator::new(
        pool.clone(),
        recognition,
        notifier.clone(),
    ));
    (orchestrator, notifier)
}

/// Event-stream body whose terminal event carries a passport result.
pub fn passport_sse_body() -> String {
    let payload = json!([{
        "data": {
            "id": "vendor-42",
            "documentName": "PASSPORT",
            "countryName": "Utopia",
            "score": 0.97,
            "ocr": {
                "validState": 1,
                "name": "Jane Doe",
                "identityCardNumber": "X1234567",
                "personalNumber": "8901234",
                "dateOfBirth": "1990-01-01"
            },
            "image": {
                "portrait": "cG9ydHJhaXQ=",
                "signature": "c2lnbmF0dXJl",
                "documentFrontSide": "ZnJvbnRfY3JvcA==",
                "documentBackSide": "YmFja19jcm9w"
            }
        }
    }]);
    format!(
        "event: heartbeat\ndata: null\n\nevent: complete\ndata: {}\n\n",
        payload
    )
}

/// Event stream that ends without ever emitting a `complete` event.
pub fn incomplete_sse_body() -> String {
    "event: generating\ndata: null\n\nevent: heartbeat\ndata: null\n\n".to_string()
}
