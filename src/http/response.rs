//! JSON error responses.
//!
//! Every error the gateway itself produces has the shape
//! `{"error": <reason phrase>, "message": <detail>}`; unmatched paths add
//! `"path"`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::config::loader::ConfigError;
use crate::routing::registry::ReloadError;

#[derive(Debug, Clone, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<&'a str>,
}

/// An error answered by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    path: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            path: None,
        }
    }

    pub fn not_found(path: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: "The requested resource was not found".to_string(),
            path: Some(path.into()),
        }
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "A valid admin bearer token is required")
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.status.canonical_reason().unwrap_or("Error"),
            message: &self.message,
            path: self.path.as_deref(),
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<ReloadError> for ApiError {
    fn from(e: ReloadError) -> Self {
        let status = match e {
            ReloadError::NotFound(_) => StatusCode::NOT_FOUND,
            ReloadError::Forbidden => StatusCode::FORBIDDEN,
            ReloadError::Busy(_) => StatusCode::CONFLICT,
            ReloadError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        };
        Self::new(status, e.to_string())
    }
}

impl From<ConfigError> for ApiError {
    fn from(e: ConfigError) -> Self {
        Self::internal(e.to_string())
    }
}
