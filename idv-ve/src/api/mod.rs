//! HTTP API handlers for idv-ve
//!
//! Thin glue over the service layer: session creation and image
//! submission (the pipeline's external trigger), session lookup, a
//! webhook delivery check, and health.

pub mod health;
pub mod sessions;
pub mod webhook;

pub use health::health_routes;
pub use sessions::session_routes;
pub use webhook::webhook_routes;
