//! Session endpoints
//!
//! Session creation is API-key gated. Image submission is the pipeline's
//! external trigger: it stores the payloads and hands the updated record
//! to the orchestrator as a spawned unit of work, so the HTTP response
//! does not wait on the recognition backend.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use idv_common::events;

use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::models::{Session, SessionStatus};
use crate::AppState;

#[derive(Debug, Deserialize, Default)]
pub struct CreateSessionRequest {
    pub vendor_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub success: bool,
    pub data: SessionView,
}

/// Session record as exposed over the API; raw image payloads are elided.
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub session_id: String,
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_valid: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Session> for SessionView {
    fn from(session: Session) -> Self {
        Self {
            session_id: session.session_id,
            status: session.status,
            session_url: session.session_url,
            vendor_id: session.vendor_id,
            document_type: session.document_type,
            document_number: session.document_number,
            first_name: session.first_name,
            last_name: session.last_name,
            date_of_birth: session.date_of_birth,
            document_valid: session.document_valid,
            document_score: session.document_score,
            error_message: session.error_message,
            created_at: session.created_at,
            updated_at: session.updated_at,
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// POST /session
pub async fn create_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateSessionRequest>,
) -> ApiResult<Json<CreateSessionResponse>> {
    let settings = state.settings.snapshot();

    let authorized = bearer_token(&headers)
        .map_or(false, |key| settings.api_keys.iter().any(|k| k == key));
    if !authorized {
        return Err(ApiError::Unauthorized("Invalid API key".to_string()));
    }

    let session = Session::new("api", request.vendor_id, &settings.session_site_url);
    db::sessions::insert_session(&state.db, &session).await?;

    info!(session_id = %session.session_id, "session created");

    state
        .notifier
        .send_notification(
            Some(&session.session_id),
            events::SESSION_CREATED,
            json!({ "status": session.status.as_str() }),
        )
        .await;

    Ok(Json(CreateSessionResponse {
        success: true,
        data: session.into(),
    }))
}

/// GET /session/{id}
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<SessionView>> {
    let session = db::sessions::load_session(&state.db, &session_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Session {} not found", session_id)))?;
    Ok(Json(session.into()))
}

#[derive(Debug, Deserialize)]
pub struct SubmitImagesRequest {
    pub front_image: String,
    pub back_image: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitImagesResponse {
    pub success: bool,
    pub status: SessionStatus,
}

/// POST /session/{id}/images
pub async fn submit_images(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<SubmitImagesRequest>,
) -> ApiResult<Json<SubmitImagesResponse>> {
    if request.front_image.is_empty() {
        return Err(ApiError::BadRequest("front_image must not be empty".to_string()));
    }

    let updated = db::sessions::submit_images(
        &state.db,
        &session_id,
        &request.front_image,
        request.back_image.as_deref(),
        Utc::now(),
    )
    .await?;
    if !updated {
        return Err(ApiError::NotFound(format!("Session {} not found", session_id)));
    }

    let session = db::sessions::load_session(&state.db, &session_id)
        .await?
        .ok_or_else(|| ApiError::Internal("session vanished after update".to_string()))?;
    let status = session.status;

    // The pipeline runs detached; the trigger only reports acceptance.
    let orchestrator = state.orchestrator.clone();
    let last_error = state.last_error.clone();
    tokio::spawn(async move {
        match orchestrator.handle_session_update(&session).await {
            Ok(Some(outcome)) => {
                info!(
                    session_id = %session.session_id,
                    success = outcome.success,
                    status = outcome.status.as_str(),
                    "verification pipeline finished"
                );
                if let Some(error) = outcome.error {
                    *last_error.write().await = Some(error);
                }
            }
            Ok(None) => info!(
                session_id = %session.session_id,
                "verification pipeline skipped (not eligible or already claimed)"
            ),
            Err(e) => {
                warn!(
                    session_id = %session.session_id,
                    error = %e,
                    "verification pipeline aborted on storage error"
                );
                *last_error.write().await = Some(e.to_string());
            }
        }
    });

    Ok(Json(SubmitImagesResponse {
        success: true,
        status,
    }))
}

pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/session", post(create_session))
        .route("/session/:session_id", get(get_session))
        .route("/session/:session_id/images", post(submit_images))
}
