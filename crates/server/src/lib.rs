//! HTTP service for the kennel portal.
//!
//! This crate provides:
//! - Storage reconciliation and orphan pruning
//! - Streaming per-dog archive export
//! - Bearer token authentication against the dog manager roles
//! - Bootstrap of the configured admin principal

pub mod auth;
pub mod bootstrap;
pub mod cors;
pub mod error;
pub mod export;
pub mod handlers;
pub mod media;
pub mod metrics;
pub mod prune;
pub mod routes;
pub mod state;

pub use auth::TraceId;
pub use error::ApiError;
pub use media::{MediaError, MediaStore};
pub use routes::create_router;
pub use state::AppState;
