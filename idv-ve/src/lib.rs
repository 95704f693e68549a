//! idv-ve library interface
//!
//! Exposes the verification engine's components for the binary and for
//! integration tests.

pub mod api;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use std::sync::Arc;

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

use idv_common::config::SettingsHandle;

use crate::services::recognition_client::RecognitionClient;
use crate::services::session_orchestrator::SessionOrchestrator;
use crate::services::webhook_notifier::WebhookNotifier;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Latest configuration snapshot
    pub settings: SettingsHandle,
    /// Verification pipeline
    pub orchestrator: Arc<SessionOrchestrator>,
    /// Outbound webhook delivery
    pub notifier: Arc<WebhookNotifier>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Most recent pipeline error, surfaced by the health endpoint
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    /// Wire the service graph from a pool and a settings handle.
    pub fn new(db: SqlitePool, settings: SettingsHandle) -> Self {
        let recognition = Arc::new(RecognitionClient::new(settings.clone()));
        let notifier = Arc::new(WebhookNotifier::new(db.clone(), settings.clone()));
        let orchestrator = Arc::new(SessionOrchestrator::new(
            db.clone(),
            recognition,
            notifier.clone(),
        ));

        Self {
            db,
            settings,
            orchestrator,
            notifier,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::session_routes())
        .merge(api::webhook_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
