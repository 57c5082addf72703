//! Error taxonomy — stable kind/status pairs for every caller-visible failure

use serde::Serialize;

use crate::validate::FieldViolation;

/// Caller-visible failure kinds. The kind/status pairing is a wire contract:
/// clients branch on it, so existing pairs must not change between versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Auth,
    NotFound,
    RateLimited,
    UpstreamTimeout,
    Upstream,
    Internal,
}

impl ErrorKind {
    /// HTTP status code carried by envelopes of this kind
    pub fn status(self) -> u16 {
        match self {
            ErrorKind::Validation => 400,
            ErrorKind::Auth => 401,
            ErrorKind::NotFound => 404,
            ErrorKind::RateLimited => 429,
            ErrorKind::UpstreamTimeout => 504,
            ErrorKind::Upstream => 502,
            ErrorKind::Internal => 500,
        }
    }
}

/// A classified pipeline failure. Every dispatcher exit other than clean
/// success is one of these before it crosses the service boundary.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("invalid parameters")]
    Validation { violations: Vec<FieldViolation> },

    #[error("rate limit exceeded, retry after {retry_after_seconds}s")]
    RateLimited { retry_after_seconds: u64 },

    #[error("backend rejected credentials: {message}")]
    Auth { message: String },

    #[error("resource not found: {message}")]
    NotFound { message: String },

    #[error("backend did not respond within {timeout_secs}s")]
    UpstreamTimeout { timeout_secs: u64 },

    #[error("backend error: {message}")]
    Upstream { message: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::Validation { .. } => ErrorKind::Validation,
            GatewayError::RateLimited { .. } => ErrorKind::RateLimited,
            GatewayError::Auth { .. } => ErrorKind::Auth,
            GatewayError::NotFound { .. } => ErrorKind::NotFound,
            GatewayError::UpstreamTimeout { .. } => ErrorKind::UpstreamTimeout,
            GatewayError::Upstream { .. } => ErrorKind::Upstream,
            GatewayError::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Build the structured envelope returned to the caller
    pub fn into_envelope(self) -> ErrorEnvelope {
        let kind = self.kind();
        let message = self.to_string();

        let (retry_after_seconds, detail) = match self {
            GatewayError::Validation { violations } => {
                let detail = serde_json::to_value(&violations).ok();
                (None, detail)
            }
            GatewayError::RateLimited {
                retry_after_seconds,
            } => (Some(retry_after_seconds), None),
            _ => (None, None),
        };

        ErrorEnvelope {
            success: false,
            error: kind,
            status: kind.status(),
            message,
            retry_after_seconds,
            detail,
        }
    }
}

/// Structured error returned for every failed invocation
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    /// Always false; mirrors the success envelope so callers can branch on one field
    pub success: bool,
    pub error: ErrorKind,
    pub status: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}
