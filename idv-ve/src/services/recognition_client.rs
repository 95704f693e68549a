//! Recognition backend client
//!
//! The backend runs a two-phase protocol for every unit of work: submit
//! base64 images to `POST /gradio_api/call/{endpoint}` and receive an
//! `event_id`, then open `GET /gradio_api/call/{endpoint}/{event_id}` as a
//! `text/event-stream` and wait for the terminal `complete` event.
//!
//! Endpoint names are dictated by the backend and preserved exactly:
//! two-sided recognition submits to `id_recognition_base64` but streams
//! from `id_recognition`, while one-sided recognition uses
//! `id_recognition_oneside_base64` for both calls.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use reqwest::header::{self, HeaderMap, HeaderValue};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use idv_common::config::{Settings, SettingsHandle};
use idv_common::sse::{complete_payload, SseDecoder};

const CALL_PATH: &str = "/gradio_api/call";

const ID_RECOGNITION_STREAM: &str = "id_recognition";
const ID_RECOGNITION_TWO_SIDED: &str = "id_recognition_base64";
const ID_RECOGNITION_ONE_SIDED: &str = "id_recognition_oneside_base64";
const FACE_LIVENESS: &str = "face_liveness_base64";
const DOCUMENT_LIVENESS: &str = "id_liveness_base64";
const FACE_COMPARISON: &str = "compare_face_base64";

const NO_FACE_DETECTED: &str = "no face detected!";
const GENUINE: &str = "genuine";

/// Recognition client errors
#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("recognition backend is not configured")]
    NotConfigured,

    #[error("invalid access token: {0}")]
    InvalidCredential(#[from] header::InvalidHeaderValue),

    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    #[error("recognition request to {endpoint} failed: {source}")]
    RequestFailed {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("submission response is missing an event id")]
    MissingEventId,

    #[error("event stream ended without a completion event")]
    StreamIncomplete,

    #[error("event stream transport error: {0}")]
    StreamTransport(#[source] reqwest::Error),

    #[error("recognition backend returned an empty result")]
    EmptyResult,
}

/// Face liveness outcome
#[derive(Debug, Clone, Serialize)]
pub struct FaceLivenessResult {
    pub status: Option<String>,
    pub is_live: bool,
    pub liveness_score: f64,
    pub face_rect: Option<Value>,
    pub angles: Option<Value>,
}

/// Document liveness outcome
#[derive(Debug, Clone, Serialize)]
pub struct DocumentLivenessResult {
    pub status: Option<String>,
    pub is_live: bool,
    pub screenreplay_score: Option<f64>,
    pub portraitreplace_score: Option<f64>,
    pub printedcutout_score: Option<f64>,
}

/// Face comparison outcome
#[derive(Debug, Clone, Serialize)]
pub struct FaceComparisonResult {
    pub result: Option<String>,
    pub similarity: Option<f64>,
}

/// HTTP client cached per backend, keyed by the configuration it was
/// built from so a settings change rebuilds it.
struct CachedClient {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

/// Client for the recognition and document-liveness backends.
///
/// Stateless apart from the lazily built, cached HTTP clients; safe to
/// share behind an `Arc`.
pub struct RecognitionClient {
    settings: SettingsHandle,
    recognition: Mutex<Option<CachedClient>>,
    document_liveness: Mutex<Option<CachedClient>>,
}

impl RecognitionClient {
    pub fn new(settings: SettingsHandle) -> Self {
        Self {
            settings,
            recognition: Mutex::new(None),
            document_liveness: Mutex::new(None),
        }
    }

    /// Run ID document recognition over one or two base64 images and
    /// return the raw result payload.
    pub async fn process_id_document(
        &self,
        front: &str,
        back: Option<&str>,
    ) -> Result<Value, RecognitionError> {
        let settings = self.settings.snapshot();
        let client = self
            .backend_client(&self.recognition, &settings.server_url, &settings.access_token)
            .await?;

        // Endpoint naming is asymmetric for the two-sided flow; backend
        // contract, do not normalize.
        let (submit_endpoint, stream_endpoint, images) = match back {
            Some(back) => (
                ID_RECOGNITION_TWO_SIDED,
                ID_RECOGNITION_STREAM,
                vec![front, back],
            ),
            None => (
                ID_RECOGNITION_ONE_SIDED,
                ID_RECOGNITION_ONE_SIDED,
                vec![front],
            ),
        };

        debug!(
            two_sided = back.is_some(),
            endpoint = submit_endpoint,
            "submitting recognition job"
        );

        let event_id = self
            .submit(&client, &settings.server_url, submit_endpoint, &images)
            .await?;
        debug!(event_id = %event_id, "recognition job accepted");

        let result = self
            .stream_result(
                &client,
                &settings.server_url,
                stream_endpoint,
                &event_id,
                &settings,
                // The job is done once the first element carries a data
                // payload; everything after it is discarded.
                |payload| {
                    payload
                        .get(0)
                        .and_then(|element| element.get("data"))
                        .filter(|data| !data.is_null())
                        .cloned()
                },
            )
            .await?;

        if result.is_null() || result.as_object().is_some_and(|map| map.is_empty()) {
            return Err(RecognitionError::EmptyResult);
        }

        info!(
            has_ocr = result.get("ocr").is_some(),
            document_name = result.get("documentName").and_then(serde_json::Value::as_str),
            "recognition result received"
        );
        Ok(result)
    }

    /// Check face liveness of a single base64 face image.
    pub async fn check_face_liveness(
        &self,
        face: &str,
    ) -> Result<FaceLivenessResult, RecognitionError> {
        let settings = self.settings.snapshot();
        let client = self
            .backend_client(&self.recognition, &settings.server_url, &settings.access_token)
            .await?;

        let element = self
            .biometric_call(&client, &settings.server_url, FACE_LIVENESS, &[face], &settings)
            .await?;
        Ok(face_liveness_from(&element))
    }

    /// Check document liveness against the document-liveness backend.
    pub async fn check_document_liveness(
        &self,
        document: &str,
    ) -> Result<DocumentLivenessResult, RecognitionError> {
        let settings = self.settings.snapshot();
        let client = self
            .backend_client(
                &self.document_liveness,
                &settings.document_liveness_server_url,
                &settings.access_token,
            )
            .await?;

        let element = self
            .biometric_call(
                &client,
                &settings.document_liveness_server_url,
                DOCUMENT_LIVENESS,
                &[document],
                &settings,
            )
            .await?;
        Ok(document_liveness_from(&element))
    }

    /// Compare two base64 face images.
    pub async fn compare_faces(
        &self,
        face_a: &str,
        face_b: &str,
    ) -> Result<FaceComparisonResult, RecognitionError> {
        let settings = self.settings.snapshot();
        let client = self
            .backend_client(&self.recognition, &settings.server_url, &settings.access_token)
            .await?;

        let element = self
            .biometric_call(
                &client,
                &settings.server_url,
                FACE_COMPARISON,
                &[face_a, face_b],
                &settings,
            )
            .await?;

        Ok(FaceComparisonResult {
            result: element
                .pointer("/data/result")
                .and_then(Value::as_str)
                .map(str::to_string),
            similarity: element.pointer("/data/similarity").and_then(Value::as_f64),
        })
    }

    /// Shared submit-then-stream shape of the biometric calls. Waits the
    /// configured delay between submission and opening the stream; the
    /// delay is a backoff courtesy to the backend, not a synchronization
    /// mechanism — the stream itself blocks until the job completes.
    async fn biometric_call(
        &self,
        client: &reqwest::Client,
        base_url: &str,
        endpoint: &str,
        images: &[&str],
        settings: &Settings,
    ) -> Result<Value, RecognitionError> {
        let event_id = self.submit(client, base_url, endpoint, images).await?;
        debug!(endpoint, event_id = %event_id, "biometric job accepted");

        if settings.poll_delay_secs > 0 {
            tokio::time::sleep(Duration::from_secs(settings.poll_delay_secs)).await;
        }

        self.stream_result(client, base_url, endpoint, &event_id, settings, |payload| {
            payload.get(0).filter(|element| !element.is_null()).cloned()
        })
        .await
    }

    /// Submit a unit of work; returns the backend's job/event identifier.
    async fn submit(
        &self,
        client: &reqwest::Client,
        base_url: &str,
        endpoint: &str,
        images: &[&str],
    ) -> Result<String, RecognitionError> {
        let url = format!("{}{}/{}", base_url.trim_end_matches('/'), CALL_PATH, endpoint);
        let body = serde_json::json!({ "data": images });

        let response = client
            .post(&url)
            .json(&body)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|source| RecognitionError::RequestFailed {
                endpoint: endpoint.to_string(),
                source,
            })?;

        let value: Value =
            response
                .json()
                .await
                .map_err(|source| RecognitionError::RequestFailed {
                    endpoint: endpoint.to_string(),
                    source,
                })?;

        value
            .get("event_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(RecognitionError::MissingEventId)
    }

    /// Open the streaming GET and decode events incrementally until
    /// `extract` yields a value from a `complete` payload.
    ///
    /// Returning drops the response body, which cancels the underlying
    /// transport read; the remainder of the stream is never buffered.
    async fn stream_result<F>(
        &self,
        client: &reqwest::Client,
        base_url: &str,
        endpoint: &str,
        event_id: &str,
        settings: &Settings,
        extract: F,
    ) -> Result<Value, RecognitionError>
    where
        F: Fn(&Value) -> Option<Value>,
    {
        let url = format!(
            "{}{}/{}/{}",
            base_url.trim_end_matches('/'),
            CALL_PATH,
            endpoint,
            event_id
        );

        let response = client
            .get(&url)
            .header(header::ACCEPT, "text/event-stream")
            .timeout(Duration::from_secs(settings.stream_timeout_secs))
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|source| RecognitionError::RequestFailed {
                endpoint: endpoint.to_string(),
                source,
            })?;

        let mut body = response.bytes_stream();
        let mut decoder = SseDecoder::new();

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(RecognitionError::StreamTransport)?;
            for block in decoder.feed(&chunk) {
                let Some(payload) = complete_payload(&block) else {
                    continue;
                };
                if let Some(value) = extract(&payload) {
                    return Ok(value);
                }
                // A completion payload without the expected element; keep
                // reading, the backend may emit another complete event.
                warn!(endpoint, "completion payload had no usable element");
            }
        }

        Err(RecognitionError::StreamIncomplete)
    }

    /// Return the cached HTTP client for a backend, rebuilding it whenever
    /// the configured base URL or credential changed.
    async fn backend_client(
        &self,
        slot: &Mutex<Option<CachedClient>>,
        base_url: &str,
        token: &str,
    ) -> Result<reqwest::Client, RecognitionError> {
        if base_url.is_empty() {
            return Err(RecognitionError::NotConfigured);
        }

        let mut guard = slot.lock().await;
        if let Some(cached) = guard.as_ref() {
            if cached.base_url == base_url && cached.token == token {
                return Ok(cached.client.clone());
            }
            debug!("backend configuration changed, rebuilding HTTP client");
        }

        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", token))?;
        auth.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(RecognitionError::ClientBuild)?;

        *guard = Some(CachedClient {
            base_url: base_url.to_string(),
            token: token.to_string(),
            client: client.clone(),
        });
        Ok(client)
    }
}

/// Shareable handle used across orchestration units
pub type SharedRecognitionClient = Arc<RecognitionClient>;

fn face_liveness_from(element: &Value) -> FaceLivenessResult {
    let result = element
        .pointer("/data/result")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let face_rect = element.pointer("/data/face_rect").cloned().filter(|v| !v.is_null());
    let angles = element.pointer("/data/angles").cloned().filter(|v| !v.is_null());

    if result == NO_FACE_DETECTED {
        return FaceLivenessResult {
            status: Some("ok".to_string()),
            is_live: false,
            liveness_score: 0.0,
            face_rect,
            angles,
        };
    }

    FaceLivenessResult {
        status: element
            .get("status")
            .and_then(Value::as_str)
            .map(str::to_string),
        is_live: result == GENUINE,
        liveness_score: element
            .pointer("/data/liveness_score")
            .and_then(Value::as_f64)
            .unwrap_or(0.0),
        face_rect,
        angles,
    }
}

fn document_liveness_from(element: &Value) -> DocumentLivenessResult {
    let result = element
        .pointer("/data/result")
        .and_then(Value::as_str)
        .unwrap_or_default();

    DocumentLivenessResult {
        status: element
            .get("status")
            .and_then(Value::as_str)
            .map(str::to_string),
        is_live: result == GENUINE,
        screenreplay_score: element
            .pointer("/data/screenreplay_integrity_score")
            .and_then(Value::as_f64),
        portraitreplace_score: element
            .pointer("/data/portraitreplace_integrity_score")
            .and_then(Value::as_f64),
        printedcutout_score: element
            .pointer("/data/printedcutout_integrity_score")
            .and_then(Value::as_f64),
    }
}
