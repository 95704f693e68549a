//! Verification session state machine
//!
//! A session progresses NOT_STARTED → IN_PROGRESS → PROCESSING_IMAGES →
//! IN_REVIEW, or into PROCESSING_FAILED from any processing step.
//! PROCESSING_FAILED is terminal for the pipeline; an external actor may
//! reset a session, which this service observes as a fresh eligible
//! transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    /// Created, no images submitted yet
    NotStarted,
    /// Document images submitted, awaiting processing
    InProgress,
    /// Claimed by the pipeline; recognition in flight
    ProcessingImages,
    /// Recognition succeeded, awaiting human review
    InReview,
    /// Recognition failed; error_message holds the cause
    ProcessingFailed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::NotStarted => "NOT_STARTED",
            SessionStatus::InProgress => "IN_PROGRESS",
            SessionStatus::ProcessingImages => "PROCESSING_IMAGES",
            SessionStatus::InReview => "IN_REVIEW",
            SessionStatus::ProcessingFailed => "PROCESSING_FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<SessionStatus> {
        match s {
            "NOT_STARTED" => Some(SessionStatus::NotStarted),
            "IN_PROGRESS" => Some(SessionStatus::InProgress),
            "PROCESSING_IMAGES" => Some(SessionStatus::ProcessingImages),
            "IN_REVIEW" => Some(SessionStatus::InReview),
            "PROCESSING_FAILED" => Some(SessionStatus::ProcessingFailed),
            _ => None,
        }
    }

    /// Entry points into the processing pipeline
    pub fn is_eligible(&self) -> bool {
        matches!(self, SessionStatus::NotStarted | SessionStatus::InProgress)
    }

    /// Terminal for this pipeline
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::InReview | SessionStatus::ProcessingFailed)
    }
}

/// Persisted session record.
///
/// Mutated only by the orchestrator and the image-submission endpoint.
/// The raw base64 image payloads are transient: cleared once successfully
/// consumed, retained on failure for manual inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub status: SessionStatus,
    pub created_by: Option<String>,
    pub session_url: Option<String>,
    pub vendor_id: Option<String>,

    /// Base64 front document image (transient)
    pub id_image_front: Option<String>,
    /// Base64 back document image (transient, optional)
    pub id_image_back: Option<String>,
    /// Captured or extracted face image
    pub face_image: Option<String>,

    // Result fields, populated on successful recognition
    pub document_type: Option<String>,
    pub document_number: Option<String>,
    pub personal_number: Option<String>,
    pub issuing_state: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub date_of_birth: Option<String>,
    pub document_valid: Option<bool>,
    pub document_score: Option<f64>,

    /// Populated only when status is PROCESSING_FAILED
    pub error_message: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(created_by: &str, vendor_id: Option<String>, session_site_url: &str) -> Self {
        let session_id = Uuid::new_v4().to_string();
        let session_url = if session_site_url.is_empty() {
            None
        } else {
            Some(format!(
                "{}/{}",
                session_site_url.trim_end_matches('/'),
                session_id
            ))
        };
        let now = Utc::now();

        Self {
            session_id,
            status: SessionStatus::NotStarted,
            created_by: Some(created_by.to_string()),
            session_url,
            vendor_id,
            id_image_front: None,
            id_image_back: None,
            face_image: None,
            document_type: None,
            document_number: None,
            personal_number: None,
            issuing_state: None,
            first_name: None,
            last_name: None,
            date_of_birth: None,
            document_valid: None,
            document_score: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Eligibility guard: processing requires an eligible status and a
    /// non-empty front image payload.
    pub fn is_eligible(&self) -> bool {
        self.status.is_eligible()
            && self
                .id_image_front
                .as_deref()
                .map_or(false, |front| !front.is_empty())
    }
}
