//! Service layer: the verification pipeline and its collaborators

pub mod recognition_client;
pub mod session_orchestrator;
pub mod webhook_notifier;

pub use recognition_client::{
    DocumentLivenessResult, FaceComparisonResult, FaceLivenessResult, RecognitionClient,
    RecognitionError,
};
pub use session_orchestrator::{ProcessingOutcome, SessionOrchestrator};
pub use webhook_notifier::WebhookNotifier;
