//! Error types for sqlrag services
//!
//! Provides a comprehensive error handling system with:
//! - Distinct error types for each failure mode of the guardrail pipeline
//!   and the query router
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

    // Guardrail errors (3xxx)
    GuardrailBlocked,

    // Resource errors (4xxx)
    NoDocumentsIndexed,

    // Rate limiting (6xxx)
    RateLimited,

    // Query errors (7xxx)
    DatabaseError,
    ConnectionError,
    QueryRejected,
    QueryExecutionFailed,

    // External service errors (8xxx)
    UpstreamError,
    EmbeddingError,
    IndexError,
    GenerationTimeout,
    GenerationUnavailable,
    ClassifierAmbiguous,
    ExternalTimeout,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::ValidationError => 1001,

            ErrorCode::GuardrailBlocked => 3001,

            ErrorCode::NoDocumentsIndexed => 4001,

            ErrorCode::RateLimited => 6001,

            ErrorCode::DatabaseError => 7001,
            ErrorCode::ConnectionError => 7002,
            ErrorCode::QueryRejected => 7003,
            ErrorCode::QueryExecutionFailed => 7004,

            ErrorCode::UpstreamError => 8001,
            ErrorCode::EmbeddingError => 8002,
            ErrorCode::IndexError => 8003,
            ErrorCode::GenerationTimeout => 8004,
            ErrorCode::GenerationUnavailable => 8005,
            ErrorCode::ClassifierAmbiguous => 8006,
            ErrorCode::ExternalTimeout => 8007,

            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
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

    // Guardrail refusal. The pipeline turns this into a refusal answer,
    // it is never returned to a caller as an error response.
    #[error("Blocked by guardrail {stage}")]
    GuardrailBlocked { stage: String },

    // Retrieval
    #[error("No documents in the document index. Run ingestion.")]
    NoDocumentsIndexed,

    // Rate limiting
    #[error("Rate limit exceeded: {limit} requests per second")]
    RateLimited { limit: u32 },

    // Query errors
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },

    #[error("Rejected unsafe SQL ({reason}): {query}")]
    QueryRejected { query: String, reason: &'static str },

    #[error("SQL error: {detail}")]
    QueryExecutionFailed { query: String, detail: String },

    // External service errors
    #[error("Embedding service error: {message}")]
    EmbeddingError { message: String },

    #[error("Document index error: {message}")]
    IndexError { message: String },

    #[error("Text generation timed out after {timeout_ms}ms")]
    GenerationTimeout { timeout_ms: u64 },

    #[error("Text generation unavailable: {message}")]
    GenerationUnavailable { message: String },

    #[error("Classifier returned an unexpected token: {output}")]
    ClassifierAmbiguous { output: String },

    #[error("{service} call timed out after {timeout_ms}ms")]
    ExternalTimeout { service: String, timeout_ms: u64 },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Internal errors
    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::GuardrailBlocked { .. } => ErrorCode::GuardrailBlocked,
            AppError::NoDocumentsIndexed => ErrorCode::NoDocumentsIndexed,
            AppError::RateLimited { .. } => ErrorCode::RateLimited,
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::DatabaseConnection { .. } => ErrorCode::ConnectionError,
            AppError::QueryRejected { .. } => ErrorCode::QueryRejected,
            AppError::QueryExecutionFailed { .. } => ErrorCode::QueryExecutionFailed,
            AppError::EmbeddingError { .. } => ErrorCode::EmbeddingError,
            AppError::IndexError { .. } => ErrorCode::IndexError,
            AppError::GenerationTimeout { .. } => ErrorCode::GenerationTimeout,
            AppError::GenerationUnavailable { .. } => ErrorCode::GenerationUnavailable,
            AppError::ClassifierAmbiguous { .. } => ErrorCode::ClassifierAmbiguous,
            AppError::ExternalTimeout { .. } => ErrorCode::ExternalTimeout,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. } |
            AppError::QueryRejected { .. } |
            AppError::QueryExecutionFailed { .. } => StatusCode::BAD_REQUEST,

            // 403 Forbidden
            AppError::GuardrailBlocked { .. } => StatusCode::FORBIDDEN,

            // 404 Not Found
            AppError::NoDocumentsIndexed => StatusCode::NOT_FOUND,

            // 429 Too Many Requests
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,

            // 500 Internal Server Error
            AppError::Database(_) |
            AppError::DatabaseConnection { .. } |
            AppError::Internal { .. } |
            AppError::Configuration { .. } |
            AppError::Serialization(_) |
            AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,

            // 502 Bad Gateway
            AppError::EmbeddingError { .. } |
            AppError::IndexError { .. } |
            AppError::ClassifierAmbiguous { .. } |
            AppError::HttpClient(_) => StatusCode::BAD_GATEWAY,

            // 503 Service Unavailable
            AppError::GenerationUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,

            // 504 Gateway Timeout
            AppError::GenerationTimeout { .. } |
            AppError::ExternalTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
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

    /// Whether this error is a deadline expiry of an external call
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            AppError::GenerationTimeout { .. } | AppError::ExternalTimeout { .. }
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

        let details = match &self {
            AppError::QueryRejected { query, .. } | AppError::QueryExecutionFailed { query, .. } => {
                Some(serde_json::json!({ "query": query }))
            }
            _ => None,
        };

        let body = ErrorResponse {
            error: ErrorDetails {
                code,
                message,
                details,
                request_id: None, // Should be filled by middleware
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string()
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_documents_is_client_error() {
        let err = AppError::NoDocumentsIndexed;
        assert_eq!(err.code(), ErrorCode::NoDocumentsIndexed);
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert!(err.is_client_error());
        assert!(err.to_string().contains("Run ingestion"));
    }

    #[test]
    fn test_validation_error() {
        let err = AppError::Validation {
            message: "query must not be empty".into(),
            field: Some("query".into()),
        };
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(!err.is_server_error());
        assert!(err.is_client_error());
    }

    #[test]
    fn test_timeouts_map_to_gateway_timeout() {
        let err = AppError::ExternalTimeout {
            service: "document_index".into(),
            timeout_ms: 5000,
        };
        assert_eq!(err.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert!(err.is_timeout());
        assert!(AppError::GenerationTimeout { timeout_ms: 10 }.is_timeout());
        assert!(!AppError::NoDocumentsIndexed.is_timeout());
    }

    #[test]
    fn test_execution_failure_message_embeds_detail() {
        let err = AppError::QueryExecutionFailed {
            query: "SELECT nope FROM products".into(),
            detail: "no such column: nope".into(),
        };
        assert_eq!(err.to_string(), "SQL error: no such column: nope");
        assert_eq!(err.code().as_code(), 7004);
    }
}
