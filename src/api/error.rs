//! Mapping of application errors onto OpenAI-style HTTP error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::models::openai::ErrorResponse;
use crate::AppError;

/// Error returned by HTTP handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// Response status.
    pub status: StatusCode,
    /// Response body.
    pub body: ErrorResponse,
}

impl ApiError {
    /// Build an error with an explicit status.
    #[must_use]
    pub fn new(
        status: StatusCode,
        message: impl Into<String>,
        error_type: &str,
        code: Option<&str>,
    ) -> Self {
        Self {
            status,
            body: ErrorResponse::new(message, error_type, code),
        }
    }

    /// `400 invalid_request_error`.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>, code: Option<&str>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message, "invalid_request_error", code)
    }

    /// `401 authentication_error`.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message, "authentication_error", None)
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Launch(msg) => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                format!("Failed to start Claude: {msg}"),
                "service_unavailable",
                Some("claude_unavailable"),
            ),
            AppError::Capacity(msg) => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                format!("Failed to start Claude: {msg}"),
                "service_unavailable",
                Some("capacity_exceeded"),
            ),
            AppError::Timeout(msg) => Self::new(
                StatusCode::GATEWAY_TIMEOUT,
                msg,
                "timeout_error",
                Some("assistant_timeout"),
            ),
            AppError::InvalidRequest(msg) => Self::invalid_request(msg, None),
            AppError::Unauthorized(msg) => Self::unauthorized(msg),
            other => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                other.to_string(),
                "internal_error",
                None,
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
