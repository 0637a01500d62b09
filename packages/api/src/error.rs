//! API error handling.
//!
//! Every failure leaves a handler as a `{code, message}` JSON body with a
//! matching HTTP status.

use actors::WorkerError;
use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use broadcast_core::ValidationError;
use db::DbError;
use serde::Serialize;

/// API error response body.
#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
}

/// API error type that can be converted to HTTP responses.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Create a 400 Bad Request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    /// Create a 404 Not Found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    /// Create a 500 Internal Server Error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }

    /// Create a 502 Bad Gateway error for upstream delivery failures.
    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, "DELIVERY_FAILED", message)
    }

    /// Create a 503 Service Unavailable error.
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorResponse {
            code: self.code,
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::new(rejection.status(), "INVALID_BODY", rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::new(rejection.status(), "INVALID_QUERY", rejection.body_text())
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::MissingField(_) => {
                ApiError::bad_request("Missing required message fields")
            }
            ValidationError::EmptyRecipients => ApiError::bad_request("No users found"),
            other => ApiError::bad_request(other.to_string()),
        }
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(msg) => ApiError::not_found(msg),
            DbError::Invalid(e) => e.into(),
            other => {
                tracing::error!("Store error: {}", other);
                ApiError::internal("Store error occurred")
            }
        }
    }
}

impl From<WorkerError> for ApiError {
    fn from(err: WorkerError) -> Self {
        match err {
            WorkerError::BroadcastNotFound(id) => {
                ApiError::not_found(format!("Broadcast not found: {}", id))
            }
            WorkerError::Database(e) => e.into(),
            WorkerError::Actor(msg) => {
                tracing::error!("Worker run failed: {}", msg);
                ApiError::service_unavailable("Delivery worker unavailable")
            }
        }
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use broadcast_core::BroadcastId;

    #[test]
    fn validation_errors_are_bad_requests() {
        let err: ApiError = ValidationError::MissingField("title").into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "Missing required message fields");

        let err: ApiError = DbError::Invalid(ValidationError::EmptyRecipients).into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "No users found");
    }

    #[test]
    fn store_details_are_not_echoed() {
        let err: ApiError = DbError::WrongType("broadcast:x:stats".into()).into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.message.contains("broadcast:x"));
    }

    #[test]
    fn missing_broadcast_is_not_found() {
        let id = BroadcastId::new();
        let err: ApiError = WorkerError::BroadcastNotFound(id).into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert!(err.message.contains(&id.to_string()));
    }
}
