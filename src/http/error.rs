//! HTTP error handling and response types.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::{control::ControlError, core::store::ErrorKind, runtime::handle::RuntimeError};

/// API error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Application error type for HTTP handlers.
#[derive(Debug)]
pub enum AppError {
    /// Body that is not JSON or does not fit the expected shape.
    InvalidBody(JsonRejection),
    /// Control surface did not answer.
    Control(ControlError),
    /// Error from the scheduler runtime.
    Runtime(RuntimeError),
}

impl AppError {
    fn status_and_body(&self) -> (StatusCode, ApiError) {
        match self {
            AppError::InvalidBody(rejection) => (
                rejection.status(),
                ApiError::new("INVALID_BODY", rejection.body_text()),
            ),
            AppError::Control(err) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ApiError::new("CONTROL_UNAVAILABLE", err.to_string()),
            ),
            AppError::Runtime(RuntimeError::Store(err)) => {
                let msg = err.to_string();
                match err.kind() {
                    ErrorKind::Conflict => (StatusCode::CONFLICT, ApiError::new("CONFLICT", msg)),
                    ErrorKind::NotFound => (StatusCode::NOT_FOUND, ApiError::new("NOT_FOUND", msg)),
                    ErrorKind::InvalidReference => (
                        StatusCode::BAD_REQUEST,
                        ApiError::new("INVALID_REFERENCE", msg),
                    ),
                    ErrorKind::Validation => (
                        StatusCode::UNPROCESSABLE_ENTITY,
                        ApiError::new("VALIDATION_ERROR", msg),
                    ),
                    ErrorKind::Internal => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        ApiError::new("INTERNAL_ERROR", msg),
                    ),
                }
            }
            AppError::Runtime(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiError::new("INTERNAL_ERROR", err.to_string()),
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = self.status_and_body();
        if status.is_server_error() {
            warn!("request failed: {}", error.message);
        }
        (status, Json(error)).into_response()
    }
}

impl From<RuntimeError> for AppError {
    fn from(err: RuntimeError) -> Self {
        AppError::Runtime(err)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidBody(rejection)
    }
}

impl From<ControlError> for AppError {
    fn from(err: ControlError) -> Self {
        AppError::Control(err)
    }
}
