//! Error types for Switchyard services
//!
//! Provides a single error enum shared by every crate with:
//! - Distinct variants for the failure modes of retrieval and routing
//! - HTTP status code mapping
//! - Structured error responses
//! - Error codes for client handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    DimensionMismatch,

    // Resource errors (4xxx)
    ItemNotFound,
    SourceNotFound,

    // Conflict errors (5xxx)
    Conflict,
    DuplicateItem,

    // Rate limiting (6xxx)
    RateLimited,

    // Persistence errors (7xxx)
    PersistenceError,

    // External service errors (8xxx)
    UpstreamError,
    EmbeddingError,
    EmbeddingTimeout,
    SourceUnavailable,
    LookupUnavailable,
    CompositionError,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
    Cancelled,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::ValidationError => 1001,
            ErrorCode::DimensionMismatch => 1005,

            ErrorCode::ItemNotFound => 4002,
            ErrorCode::SourceNotFound => 4003,

            ErrorCode::Conflict => 5001,
            ErrorCode::DuplicateItem => 5002,

            ErrorCode::RateLimited => 6001,

            ErrorCode::PersistenceError => 7001,

            ErrorCode::UpstreamError => 8001,
            ErrorCode::EmbeddingError => 8002,
            ErrorCode::EmbeddingTimeout => 8003,
            ErrorCode::SourceUnavailable => 8004,
            ErrorCode::LookupUnavailable => 8005,
            ErrorCode::CompositionError => 8006,

            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
            ErrorCode::Cancelled => 9004,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    // Resource errors
    #[error("Item not found in source {source_tag}: {id}")]
    ItemNotFound { source_tag: String, id: String },

    #[error("Knowledge source not found: {name}")]
    SourceNotFound { name: String },

    // Conflict errors
    #[error("Duplicate item id {id} in source {source_tag}")]
    DuplicateItem { source_tag: String, id: String },

    // Rate limiting
    #[error("Rate limit exceeded: {limit} requests per second")]
    RateLimited { limit: u32 },

    // Persistence errors
    #[error("Persistence error: {message}")]
    Persistence { message: String },

    // External service errors
    #[error("Embedding service error: {message}")]
    EmbeddingError { message: String },

    #[error("Embedding timeout after {timeout_ms}ms")]
    EmbeddingTimeout { timeout_ms: u64 },

    #[error("Knowledge source unavailable: {source_tag}: {message}")]
    SourceUnavailable { source_tag: String, message: String },

    #[error("Specialist lookup unavailable: {message}")]
    LookupUnavailable { message: String },

    #[error("Answer composition failed: {message}")]
    CompositionError { message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Internal errors
    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Operation cancelled")]
    Cancelled,

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::DimensionMismatch { .. } => ErrorCode::DimensionMismatch,
            AppError::ItemNotFound { .. } => ErrorCode::ItemNotFound,
            AppError::SourceNotFound { .. } => ErrorCode::SourceNotFound,
            AppError::DuplicateItem { .. } => ErrorCode::DuplicateItem,
            AppError::RateLimited { .. } => ErrorCode::RateLimited,
            AppError::Persistence { .. } => ErrorCode::PersistenceError,
            AppError::EmbeddingError { .. } => ErrorCode::EmbeddingError,
            AppError::EmbeddingTimeout { .. } => ErrorCode::EmbeddingTimeout,
            AppError::SourceUnavailable { .. } => ErrorCode::SourceUnavailable,
            AppError::LookupUnavailable { .. } => ErrorCode::LookupUnavailable,
            AppError::CompositionError { .. } => ErrorCode::CompositionError,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Cancelled => ErrorCode::Cancelled,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. } | AppError::DimensionMismatch { .. } => {
                StatusCode::BAD_REQUEST
            }

            // 404 Not Found
            AppError::ItemNotFound { .. } | AppError::SourceNotFound { .. } => {
                StatusCode::NOT_FOUND
            }

            // 409 Conflict
            AppError::DuplicateItem { .. } => StatusCode::CONFLICT,

            // 429 Too Many Requests
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,

            // 408 Request Timeout
            AppError::Cancelled => StatusCode::REQUEST_TIMEOUT,

            // 500 Internal Server Error
            AppError::Persistence { .. }
            | AppError::Internal { .. }
            | AppError::Configuration { .. }
            | AppError::Serialization(_)
            | AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,

            // 502 Bad Gateway
            AppError::EmbeddingError { .. }
            | AppError::EmbeddingTimeout { .. }
            | AppError::CompositionError { .. }
            | AppError::HttpClient(_) => StatusCode::BAD_GATEWAY,

            // 503 Service Unavailable
            AppError::SourceUnavailable { .. } | AppError::LookupUnavailable { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        }
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Errors raised by an embedding or generation backend
    pub fn is_provider_error(&self) -> bool {
        matches!(
            self,
            AppError::EmbeddingError { .. }
                | AppError::EmbeddingTimeout { .. }
                | AppError::CompositionError { .. }
                | AppError::HttpClient(_)
        )
    }
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        // Log based on severity
        if self.is_server_error() {
            tracing::error!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        let body = ErrorResponse {
            error: ErrorDetails {
                code,
                message,
                details: None,
                request_id: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Persistence {
            message: err.to_string(),
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = AppError::ItemNotFound {
            source_tag: "wiki".into(),
            id: "42".into(),
        };
        assert_eq!(err.code(), ErrorCode::ItemNotFound);
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_duplicate_is_conflict() {
        let err = AppError::DuplicateItem {
            source_tag: "articles".into(),
            id: "a-1".into(),
        };
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert!(err.is_client_error());
        assert_eq!(err.code().as_code(), 5002);
    }

    #[test]
    fn test_provider_errors() {
        let err = AppError::EmbeddingTimeout { timeout_ms: 500 };
        assert!(err.is_provider_error());
        assert!(err.is_server_error());

        let err = AppError::Persistence {
            message: "disk full".into(),
        };
        assert!(!err.is_provider_error());
        assert_eq!(err.code(), ErrorCode::PersistenceError);
    }

    #[test]
    fn test_io_error_maps_to_persistence() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err: AppError = io.into();
        assert_eq!(err.code(), ErrorCode::PersistenceError);
    }
}
