//! Error type system for BookHub
//!
//! This module provides the error type shared by every layer:
//! - Classification of failures into HTTP status codes
//! - JSON error bodies carrying the request trace ID
//! - Conversion of SQLite constraint failures into conflicts
//! - Error context helpers for startup code

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rusqlite::ErrorCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

tokio::task_local! {
    /// Trace ID of the request currently being served
    pub static TRACE_ID: String;
}

/// Return the trace ID of the current request, or a fresh one outside a request
pub fn current_trace_id() -> String {
    TRACE_ID
        .try_with(|id| id.clone())
        .unwrap_or_else(|_| Uuid::new_v4().to_string())
}

/// Main error type for the BookHub backend
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // System-level errors
    #[error("System initialization failed: {0}")]
    InitializationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    // Request errors
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    // Access errors
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Permission denied: missing permissions {}", .0.join(", "))]
    MissingPermissions(Vec<String>),

    // Resource errors
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Resource limit exceeded: {0}")]
    ResourceLimitExceeded(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    // Runtime errors
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Task error: {0}")]
    TaskError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::InvalidRequest(_)
            | AppError::ValidationError(_)
            | AppError::SerializationError(_) => StatusCode::BAD_REQUEST,

            // 401 Unauthorized
            AppError::AuthenticationError(_) => StatusCode::UNAUTHORIZED,

            // 403 Forbidden
            AppError::PermissionDenied(_) | AppError::MissingPermissions(_) => {
                StatusCode::FORBIDDEN
            }

            // 404 Not Found
            AppError::NotFound(_) => StatusCode::NOT_FOUND,

            // 408 Request Timeout
            AppError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,

            // 409 Conflict
            AppError::Conflict(_) => StatusCode::CONFLICT,

            // 429 Too Many Requests
            AppError::ResourceLimitExceeded(_) => StatusCode::TOO_MANY_REQUESTS,

            // 500 Internal Server Error
            AppError::InitializationError(_)
            | AppError::ConfigError(_)
            | AppError::DatabaseError(_)
            | AppError::IoError(_)
            | AppError::TaskError(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error type name for API responses
    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::InitializationError(_) => "InitializationError",
            AppError::ConfigError(_) => "ConfigError",
            AppError::DatabaseError(_) => "DatabaseError",
            AppError::InvalidRequest(_) => "BadRequest",
            AppError::ValidationError(_) => "ValidationError",
            AppError::SerializationError(_) => "SerializationError",
            AppError::AuthenticationError(_) => "AuthenticationError",
            AppError::PermissionDenied(_) | AppError::MissingPermissions(_) => "PermissionDenied",
            AppError::NotFound(_) => "NotFound",
            AppError::Conflict(_) => "Conflict",
            AppError::ResourceLimitExceeded(_) => "ResourceLimitExceeded",
            AppError::Timeout(_) => "Timeout",
            AppError::IoError(_) => "IoError",
            AppError::TaskError(_) => "TaskError",
            AppError::Internal(_) => "InternalError",
        }
    }

    /// Structured details attached to the error body
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            AppError::MissingPermissions(missing) => Some(serde_json::json!({
                "missing_permissions": missing,
            })),
            _ => None,
        }
    }

    /// Classify a failed write, turning UNIQUE and PRIMARY KEY violations into conflicts
    pub fn from_write<F>(err: rusqlite::Error, conflict: F) -> Self
    where
        F: FnOnce() -> String,
    {
        if let rusqlite::Error::SqliteFailure(ref failure, _) = err {
            if failure.code == ErrorCode::ConstraintViolation {
                match failure.extended_code {
                    // SQLITE_CONSTRAINT_UNIQUE, SQLITE_CONSTRAINT_PRIMARYKEY
                    2067 | 1555 => return AppError::Conflict(conflict()),
                    // SQLITE_CONSTRAINT_FOREIGNKEY
                    787 => {
                        return AppError::InvalidRequest(
                            "Referenced resource does not exist".to_string(),
                        )
                    }
                    _ => {}
                }
            }
        }
        AppError::DatabaseError(err)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::SerializationError(err.to_string())
    }
}

/// Error type recorded on failed responses so outer layers can classify them
#[derive(Debug, Clone, Copy)]
pub struct ErrorType(pub &'static str);

/// Error response structure for API endpoints
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error type identifier
    pub error: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// Trace ID of the failed request
    pub trace_id: String,
}

impl ErrorResponse {
    /// Create a new error response with a specific trace ID
    pub fn with_trace_id(error: String, message: String, trace_id: String) -> Self {
        Self {
            error,
            message,
            details: None,
            trace_id,
        }
    }

    /// Create an error response from an AppError within the current request
    pub fn from_error(error: &AppError) -> Self {
        Self {
            error: error.error_type().to_string(),
            message: error.to_string(),
            details: error.details(),
            trace_id: current_trace_id(),
        }
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {} (trace_id: {})",
            self.error,
            self.message,
            self.details.as_ref().map_or("", |_| "with details"),
            self.trace_id
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();
        let error_response = ErrorResponse::from_error(&self);

        if status_code.is_server_error() {
            tracing::error!(
                error_type = self.error_type(),
                trace_id = %error_response.trace_id,
                status_code = %status_code,
                "Request failed: {}",
                self
            );
        } else {
            tracing::warn!(
                error_type = self.error_type(),
                trace_id = %error_response.trace_id,
                status_code = %status_code,
                "Request rejected: {}",
                self
            );
        }

        let mut response = (status_code, Json(error_response)).into_response();
        response.extensions_mut().insert(ErrorType(self.error_type()));
        response
    }
}

/// Result type alias for operations that can fail with AppError
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            AppError::InvalidRequest("test".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::AuthenticationError("test".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::MissingPermissions(vec!["book:create".into()]).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::NotFound("test".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Conflict("test".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::DatabaseError(rusqlite::Error::InvalidQuery).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_types() {
        assert_eq!(AppError::InvalidRequest("x".into()).error_type(), "BadRequest");
        assert_eq!(
            AppError::MissingPermissions(vec![]).error_type(),
            "PermissionDenied"
        );
        assert_eq!(AppError::Conflict("x".into()).error_type(), "Conflict");
    }

    #[test]
    fn test_missing_permissions_details() {
        let error = AppError::MissingPermissions(vec!["book:create".into(), "book:update".into()]);
        let response = ErrorResponse::from_error(&error);

        assert_eq!(response.error, "PermissionDenied");
        assert!(response.message.contains("book:create, book:update"));
        assert_eq!(
            response.details.unwrap()["missing_permissions"][1],
            "book:update"
        );
    }

    #[test]
    fn test_unique_violation_becomes_conflict() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (name TEXT UNIQUE); INSERT INTO t VALUES ('a');")
            .unwrap();
        let err = conn.execute("INSERT INTO t VALUES ('a')", []).unwrap_err();

        let mapped = AppError::from_write(err, || "name taken".to_string());
        assert!(matches!(mapped, AppError::Conflict(ref m) if m == "name taken"));
    }

    #[tokio::test]
    async fn test_trace_id_follows_request_scope() {
        let inside = TRACE_ID
            .scope("trace-123".to_string(), async { current_trace_id() })
            .await;
        assert_eq!(inside, "trace-123");

        let outside = current_trace_id();
        assert!(Uuid::parse_str(&outside).is_ok());
    }

    #[test]
    fn test_error_context() {
        let result: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"));

        let err = result.context("Failed to open database").unwrap_err();
        assert!(err.to_string().contains("Failed to open database"));
        assert!(err.to_string().contains("file not found"));
    }
}
