//! Gateway error taxonomy
//!
//! Every failure that reaches a caller is one of seven kinds. The kind is part
//! of the wire contract so callers can branch on it; only
//! `BackendUnavailable` is worth retrying as-is.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};
use std::fmt;
use thiserror::Error;

/// Classified error kind returned to callers verbatim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Unauthorized,
    RateLimited,
    PermissionDenied,
    Malformed,
    NotFound,
    Conflict,
    BackendUnavailable,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "Unauthorized",
            Self::RateLimited => "RateLimited",
            Self::PermissionDenied => "PermissionDenied",
            Self::Malformed => "Malformed",
            Self::NotFound => "NotFound",
            Self::Conflict => "Conflict",
            Self::BackendUnavailable => "BackendUnavailable",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::PermissionDenied => StatusCode::FORBIDDEN,
            Self::Malformed => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict => StatusCode::CONFLICT,
            Self::BackendUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Whether a caller may resend the identical request
    ///
    /// `Conflict` needs a fresh read first, so it is not retryable as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::BackendUnavailable)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed error produced by any pipeline stage
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct GatewayError {
    pub kind: ErrorKind,
    pub message: String,
    /// Seconds until the current rate-limit window closes
    pub retry_after_secs: Option<u64>,
    /// Column names rejected by the allowlist
    pub offending_columns: Vec<String>,
}

impl GatewayError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after_secs: None,
            offending_columns: Vec::new(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, message)
    }

    pub fn rate_limited(retry_after_secs: u64) -> Self {
        Self {
            retry_after_secs: Some(retry_after_secs),
            ..Self::new(
                ErrorKind::RateLimited,
                format!("Rate limit exceeded, retry after {retry_after_secs}s"),
            )
        }
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PermissionDenied, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Malformed, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn backend_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BackendUnavailable, message)
    }

    pub fn with_offending_columns(mut self, columns: Vec<String>) -> Self {
        self.offending_columns = columns;
        self
    }

    /// Body of the error envelope: `{"kind": ..., "message": ..., "details"?: ...}`
    pub fn to_json(&self) -> JsonValue {
        let mut error = Map::new();
        error.insert("kind".to_string(), JsonValue::String(self.kind.as_str().to_string()));
        error.insert("message".to_string(), JsonValue::String(self.message.clone()));

        let mut details = Map::new();
        if let Some(secs) = self.retry_after_secs {
            details.insert("retryAfterSecs".to_string(), json!(secs));
        }
        if !self.offending_columns.is_empty() {
            details.insert("columns".to_string(), json!(self.offending_columns));
        }
        if !details.is_empty() {
            error.insert("details".to_string(), JsonValue::Object(details));
        }

        json!({ "success": false, "error": error })
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.kind.status_code();

        if status.is_server_error() {
            tracing::error!(kind = %self.kind, message = %self.message, "Request failed");
        } else {
            tracing::debug!(kind = %self.kind, message = %self.message, "Request rejected");
        }

        let mut response = (status, Json(self.to_json())).into_response();
        if let Some(secs) = self.retry_after_secs {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
