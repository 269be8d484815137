//! HTTP surface and background controllers for the chorus creator node.
//!
//! This crate provides:
//! - The replication endpoints (export, clock probe, sync trigger, status)
//! - The content byte-stream endpoints
//! - The sync execution pipeline
//! - The Snapback controller and skipped-file retry loop
//! - Identity bootstrap

pub mod auth;
pub mod bootstrap;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod skipped;
pub mod snapback;
pub mod state;
pub mod sync;

pub use error::ApiError;
pub use routes::create_router;
pub use state::{AppState, NodeIdentity};
