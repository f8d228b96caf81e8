//! Error types for vitalsync-core

use thiserror::Error;

/// Main error type for the vitalsync-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Provider API error
    #[error("provider error: {0}")]
    Provider(String),

    /// User not found
    #[error("user not found: {0}")]
    UserNotFound(String),
}

/// Result type alias for vitalsync-core
pub type Result<T> = std::result::Result<T, Error>;
