//! Session verification pipeline
//!
//! One orchestration unit per eligible session transition: claim the
//! record, drive recognition, archive the produced images, persist the
//! result, and notify subscribers at each phase. Any failure inside the
//! pipeline is converted into the terminal PROCESSING_FAILED state here
//! and never re-raised past this boundary.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use sqlx::SqlitePool;
use tracing::{debug, error, info};

use idv_common::events;
use idv_common::Result;

use crate::db;
use crate::models::{Session, SessionStatus, VerificationResult};
use crate::services::recognition_client::RecognitionClient;
use crate::services::webhook_notifier::WebhookNotifier;

/// Summary handed back to the trigger. Informational only; the persisted
/// session record is the authoritative outcome.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingOutcome {
    pub success: bool,
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Drives a session through recognition and into a terminal state.
pub struct SessionOrchestrator {
    db: SqlitePool,
    recognition: Arc<RecognitionClient>,
    notifier: Arc<WebhookNotifier>,
}

impl SessionOrchestrator {
    pub fn new(
        db: SqlitePool,
        recognition: Arc<RecognitionClient>,
        notifier: Arc<WebhookNotifier>,
    ) -> Self {
        Self {
            db,
            recognition,
            notifier,
        }
    }

    /// React to a session record change.
    ///
    /// Returns `None` when the snapshot was not eligible or another
    /// trigger won the claim; both are clean no-ops with no writes and no
    /// webhooks. Otherwise the session ends in exactly one of IN_REVIEW or
    /// PROCESSING_FAILED.
    pub async fn handle_session_update(
        &self,
        session: &Session,
    ) -> Result<Option<ProcessingOutcome>> {
        if !session.is_eligible() {
            debug!(
                session_id = %session.session_id,
                status = session.status.as_str(),
                "session not eligible for processing, skipping"
            );
            return Ok(None);
        }

        // The conditional claim write is the mutual-exclusion gate: of any
        // number of concurrent triggers for this session, exactly one sees
        // rows_affected == 1.
        let claimed =
            db::sessions::claim_for_processing(&self.db, &session.session_id, Utc::now()).await?;
        if !claimed {
            debug!(
                session_id = %session.session_id,
                "another trigger claimed this session, skipping"
            );
            return Ok(None);
        }

        info!(
            session_id = %session.session_id,
            has_back_image = session.id_image_back.is_some(),
            "session claimed, starting verification"
        );

        self.notifier
            .send_notification(
                Some(&session.session_id),
                events::SESSION_PROCESSING_STARTED,
                json!({ "status": SessionStatus::ProcessingImages.as_str() }),
            )
            .await;

        match self.process(session).await {
            Ok(result) => {
                info!(
                    session_id = %session.session_id,
                    document_type = result.document_type.as_deref(),
                    document_valid = result.document_valid,
                    "verification completed"
                );

                self.notifier
                    .send_notification(
                        Some(&session.session_id),
                        events::SESSION_COMPLETED,
                        json!({
                            "status": SessionStatus::InReview.as_str(),
                            "document_type": result.document_type,
                            "document_valid": result.document_valid,
                        }),
                    )
                    .await;

                Ok(Some(ProcessingOutcome {
                    success: true,
                    status: SessionStatus::InReview,
                    error: None,
                }))
            }
            Err(e) => {
                let message = e.to_string();
                error!(
                    session_id = %session.session_id,
                    error = %message,
                    "verification failed"
                );

                db::sessions::fail_session(&self.db, &session.session_id, &message, Utc::now())
                    .await?;

                self.notifier
                    .send_notification(
                        Some(&session.session_id),
                        events::SESSION_FAILED,
                        json!({ "error": message }),
                    )
                    .await;

                Ok(Some(ProcessingOutcome {
                    success: false,
                    status: SessionStatus::ProcessingFailed,
                    error: Some(message),
                }))
            }
        }
    }

    /// Recognition, archival, and the success write. Every error here is
    /// caught by the caller and turned into the failure transition.
    async fn process(&self, session: &Session) -> anyhow::Result<VerificationResult> {
        let front = session
            .id_image_front
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("front image missing from claimed session"))?;

        let raw = self
            .recognition
            .process_id_document(front, session.id_image_back.as_deref())
            .await?;

        let result = VerificationResult::from_raw(&raw).validate()?;

        // Archive everything this run produced or consumed, one atomic
        // batch. The pre-crop originals go in alongside the backend's
        // crops.
        db::images::archive_images(
            &self.db,
            &session.session_id,
            &[
                ("portrait", result.images.portrait.as_deref()),
                ("signature", result.images.signature.as_deref()),
                ("document_front", result.images.document_front.as_deref()),
                ("document_back", result.images.document_back.as_deref()),
                ("face_image", session.face_image.as_deref()),
                ("uncropped_id_front", session.id_image_front.as_deref()),
                ("uncropped_id_back", session.id_image_back.as_deref()),
            ],
            Utc::now(),
        )
        .await?;

        db::sessions::complete_session(&self.db, &session.session_id, &result, Utc::now()).await?;

        Ok(result)
    }
}
