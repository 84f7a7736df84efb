//! Error types for the RAG pipeline

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Result type alias for RAG operations
pub type Result<T> = std::result::Result<T, Error>;

/// RAG pipeline errors
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error (missing credentials, dimensionality mismatch).
    /// Fatal at startup, never retried.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Caller supplied malformed arguments
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Transient provider signal (rate limit, quota exceeded).
    /// Carries the raw provider payload so retry hints can be parsed.
    #[error("Transient provider error: {0}")]
    Transient(String),

    /// Retries against a transient provider signal were exhausted
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Non-retryable generation failure (auth, malformed request, network)
    #[error("Generation failed: {0}")]
    Upstream(String),

    /// Embedding error
    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    /// Vector index error
    #[error("Vector index error: {0}")]
    VectorDb(String),

    /// Vector index file is held by another process
    #[error("Resource busy: {0}")]
    ResourceBusy(String),

    /// Vector index file is damaged; no automatic repair is attempted
    #[error("Index corruption: {0}")]
    IndexCorruption(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an embedding error
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding(message.into())
    }

    /// Create a vector db error
    pub fn vector_db(message: impl Into<String>) -> Self {
        Self::VectorDb(message.into())
    }

    /// Create an upstream generation error
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether a bounded retry may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::VectorDb(err.to_string())
    }
}

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        Error::InvalidInput(rejection.body_text())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            Error::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            Error::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
            Error::Transient(_) | Error::RateLimited(_) => {
                (StatusCode::TOO_MANY_REQUESTS, "rate_limited")
            }
            Error::Upstream(_) => (StatusCode::BAD_GATEWAY, "upstream_error"),
            Error::Embedding(_) => (StatusCode::INTERNAL_SERVER_ERROR, "embedding_error"),
            Error::VectorDb(_) => (StatusCode::INTERNAL_SERVER_ERROR, "vector_db_error"),
            Error::ResourceBusy(_) => (StatusCode::SERVICE_UNAVAILABLE, "resource_busy"),
            Error::IndexCorruption(_) => (StatusCode::INTERNAL_SERVER_ERROR, "index_corruption"),
            Error::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "io_error"),
            Error::Json(_) => (StatusCode::BAD_REQUEST, "json_error"),
            Error::Http(_) => (StatusCode::BAD_GATEWAY, "http_error"),
            Error::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let body = Json(json!({
            "error": {
                "type": error_type,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}
