//! # Error Handling
//!
//! Application-wide error types and their conversion to HTTP responses.
//!
//! ## Error Categories:
//! - **Internal**: Server-side problems (500)
//! - **BadRequest**: Client sent invalid data (400)
//! - **NotFound**: Referenced resource/file does not exist (404)
//! - **UnsupportedFormat**: Audio container cannot be parsed as PCM (415)
//! - **CapabilityUnavailable**: A backend failed to load/initialize (503)
//! - **Backend**: A loaded backend failed during a call (500)
//! - **ConfigError**: Configuration problems (500)
//!
//! All of these are value-level failures: none should terminate the serving
//! process. Diagnostics failures (`UnsupportedFormat`) never surface through
//! the transcription flow — the STT service downgrades them to an omitted
//! diagnostics block.

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

use crate::capability::CapabilityError;

/// Custom error types for the application.
#[derive(Debug)]
pub enum AppError {
    /// Internal server errors (I/O failures, poisoned locks, etc.)
    Internal(String),

    /// Client sent invalid or malformed data
    BadRequest(String),

    /// Referenced resource (session, file, path) was not found
    NotFound(String),

    /// Audio container is not uncompressed PCM we can inspect
    UnsupportedFormat(String),

    /// An optional heavy backend is not available; carries the probe reason
    CapabilityUnavailable(String),

    /// A loaded backend raised during an actual call
    Backend(String),

    /// Configuration file or environment variable problems
    ConfigError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::UnsupportedFormat(msg) => write!(f, "Unsupported format: {}", msg),
            AppError::CapabilityUnavailable(msg) => write!(f, "Capability unavailable: {}", msg),
            AppError::Backend(msg) => write!(f, "Backend error: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

/// Converts application errors into structured JSON HTTP responses.
///
/// All errors share one body shape:
/// ```json
/// { "error": { "type": "...", "message": "...", "timestamp": "..." } }
/// ```
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        use actix_web::http::StatusCode;

        let (status, error_type, message) = match self {
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            AppError::UnsupportedFormat(msg) => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "unsupported_format",
                msg.clone(),
            ),
            AppError::CapabilityUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "capability_unavailable",
                msg.clone(),
            ),
            AppError::Backend(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "backend_error", msg.clone()),
            AppError::ConfigError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error", msg.clone()),
        };

        HttpResponse::build(status).json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            AppError::NotFound(err.to_string())
        } else {
            AppError::Internal(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON parsing error: {}", err))
    }
}

/// Diagnostics failures keep their two-way split: missing file versus a
/// container we cannot parse.
impl From<crate::audio::DiagnosticsError> for AppError {
    fn from(err: crate::audio::DiagnosticsError) -> Self {
        use crate::audio::DiagnosticsError;
        match err {
            DiagnosticsError::NotFound(path) => AppError::NotFound(path),
            DiagnosticsError::UnsupportedFormat(msg) => AppError::UnsupportedFormat(msg),
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

/// Gate errors map onto the two backend-shaped variants so route handlers
/// can bubble them with `?`.
impl From<CapabilityError> for AppError {
    fn from(err: CapabilityError) -> Self {
        match err {
            CapabilityError::Unavailable(reason) => AppError::CapabilityUnavailable(reason),
            CapabilityError::Backend(msg) => AppError::Backend(msg),
        }
    }
}

/// Type alias for Results that use our custom error type.
pub type AppResult<T> = Result<T, AppError>;
