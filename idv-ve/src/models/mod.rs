//! Data models for the verification engine

pub mod session;
pub mod verification_result;

pub use session::{Session, SessionStatus};
pub use verification_result::{ImageBundle, ResultError, VerificationResult};
