//! Normalized error taxonomy
//!
//! Every backend failure is translated into exactly one [`ErrorKind`] at the
//! adapter boundary. The router and the endpoint handlers pass these errors
//! through unchanged; the kind decides the HTTP status callers observe.

use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use thiserror::Error;

/// Boxed original error kept for logs and `source()` chains
pub type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Closed set of failure categories visible to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    InvalidParameters,
    AuthenticationFailed,
    PermissionDenied,
    NotFound,
    UnsupportedScheme,
    Unavailable,
    Internal,
}

impl ErrorKind {
    /// Default HTTP status for this kind
    pub fn status(self) -> u16 {
        match self {
            ErrorKind::InvalidParameters => 400,
            ErrorKind::AuthenticationFailed => 401,
            ErrorKind::PermissionDenied => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::UnsupportedScheme => 400,
            ErrorKind::Unavailable => 503,
            ErrorKind::Internal => 500,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidParameters => "InvalidParameters",
            ErrorKind::AuthenticationFailed => "AuthenticationFailed",
            ErrorKind::PermissionDenied => "PermissionDenied",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::UnsupportedScheme => "UnsupportedScheme",
            ErrorKind::Unavailable => "Unavailable",
            ErrorKind::Internal => "Internal",
        }
    }

    /// Classify an HTTP status returned by a remote backend
    pub fn from_upstream_status(status: u16) -> Self {
        match status {
            400 | 409 | 411 | 412 | 416 | 422 => ErrorKind::InvalidParameters,
            401 => ErrorKind::AuthenticationFailed,
            403 => ErrorKind::PermissionDenied,
            404 | 410 => ErrorKind::NotFound,
            408 | 429 => ErrorKind::Unavailable,
            500..=599 => ErrorKind::Unavailable,
            _ => ErrorKind::Internal,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized error crossing the dispatch boundary
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct GatewayError {
    pub kind: ErrorKind,
    pub message: String,
    /// Status the backend answered with, when it answered at all
    pub upstream_status: Option<u16>,
    #[source]
    pub cause: Option<Cause>,
}

impl GatewayError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            upstream_status: None,
            cause: None,
        }
    }

    pub fn invalid_parameters(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidParameters, message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AuthenticationFailed, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn unsupported_scheme(scheme: &str) -> Self {
        Self::new(
            ErrorKind::UnsupportedScheme,
            format!("no adapter registered for scheme '{}'", scheme),
        )
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unavailable, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Missing required field, reported before any remote call
    pub fn missing_field(field: &str) -> Self {
        Self::invalid_parameters(format!("missing required field '{}'", field))
    }

    pub fn with_cause(mut self, cause: impl Into<Cause>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn with_upstream_status(mut self, status: u16) -> Self {
        self.upstream_status = Some(status);
        self
    }

    /// HTTP status exposed to callers
    ///
    /// `Unavailable` is a 502 when the backend answered with a server error
    /// and a 503 when it could not be reached at all.
    pub fn status(&self) -> u16 {
        match (self.kind, self.upstream_status) {
            (ErrorKind::Unavailable, Some(status)) if status >= 500 => 502,
            (kind, _) => kind.status(),
        }
    }

    /// Caller-facing error object
    pub fn to_json(&self) -> Value {
        json!({
            "kind": self.kind,
            "message": self.message,
            "httpStatus": self.status(),
        })
    }
}

/// Anything escaping without a mapping is an internal failure
impl From<anyhow::Error> for GatewayError {
    fn from(err: anyhow::Error) -> Self {
        let message = format!("{:#}", err);
        GatewayError::internal(message).with_cause(Cause::from(err))
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::internal(format!("malformed backend payload: {}", err)).with_cause(err)
    }
}
