//! HTTP error handling for the rendezvous API.
//!
//! Core errors become a JSON `{"error": ..., "code": ...}` body with a
//! matching status code.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::error::Error;
use crate::signaling::messages::ErrorResponse;

/// API error response.
#[derive(Debug, Clone)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

/// Result type for handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl ApiError {
    /// Create an error with an explicit status.
    #[must_use]
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorResponse {
                error: message.into(),
                code: None,
            },
        }
    }

    /// Attach an error code.
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.body.code = Some(code.into());
        self
    }

    /// Create a bad request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// Create a not found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message).with_code("E002")
    }

    /// HTTP status of this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        self.status
    }

    /// Human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.body.error
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::SessionNotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidCodeFormat(_) | Error::Serialization(_) | Error::Negotiation(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::CodeCollision(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let api = Self::new(status, err.to_string());
        match err.code() {
            Some(code) => api.with_code(code),
            None => api,
        }
    }
}
