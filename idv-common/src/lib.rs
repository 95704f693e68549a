//! Shared library for the IDV services
//!
//! Holds the pieces more than one binary needs: the common error type,
//! configuration resolution with hot-reloaded snapshots, webhook event
//! types, and the incremental server-sent-event decoder used by the
//! recognition protocol client.

pub mod config;
pub mod error;
pub mod events;
pub mod sse;

pub use error::{Error, Result};
