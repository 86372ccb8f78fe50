//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid dog id: {0}")]
    InvalidDogId(String),

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("unknown permission role: {0}")]
    UnknownRole(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
