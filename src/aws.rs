//! Shared plumbing for the AWS backends
//!
//! SDK error classification, timestamp formatting and the session handle the
//! AWS backends build their clients from.

use crate::auth::SessionProvider;
use crate::error::{ErrorKind, GatewayError};
use crate::locator::BackendFamily;
use aws_config::SdkConfig;
use aws_sdk_s3::error::SdkError;
use aws_smithy_types::date_time::Format;
use aws_smithy_types::error::display::DisplayErrorContext;
use aws_smithy_types::error::metadata::ProvideErrorMetadata;
use aws_smithy_types::DateTime;
use serde_json::Value;
use std::sync::Arc;

/// Error codes meaning the caller's credentials were not accepted
const AUTHENTICATION_CODES: &[&str] = &[
    "InvalidAccessKeyId",
    "SignatureDoesNotMatch",
    "ExpiredToken",
    "ExpiredTokenException",
    "InvalidClientTokenId",
    "UnrecognizedClientException",
    "AuthFailure",
    "MissingAuthenticationToken",
    "InvalidToken",
];

/// Error codes meaning the caller is authenticated but not allowed
const PERMISSION_CODES: &[&str] = &[
    "AccessDenied",
    "AccessDeniedException",
    "UnauthorizedOperation",
    "AllAccessDisabled",
];

/// Error codes meaning the addressed resource does not exist
const NOT_FOUND_CODES: &[&str] = &[
    "NoSuchBucket",
    "NoSuchKey",
    "NotFound",
    "ResourceNotFoundException",
    "NoSuchEntity",
    "InvalidInstanceID.NotFound",
];

/// Error codes meaning the backend is throttling or temporarily failing
const UNAVAILABLE_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "ThrottledException",
    "TooManyRequestsException",
    "RequestLimitExceeded",
    "ProvisionedThroughputExceededException",
    "SlowDown",
    "ServiceUnavailable",
    "ServiceUnavailableException",
    "InternalError",
    "InternalFailure",
    "InternalServerError",
    "RequestTimeout",
];

/// Classify an AWS service error by code, falling back to its HTTP status
pub fn classify_aws_error(code: Option<&str>, status: u16) -> ErrorKind {
    if let Some(code) = code {
        if AUTHENTICATION_CODES.contains(&code) {
            return ErrorKind::AuthenticationFailed;
        }
        if PERMISSION_CODES.contains(&code) {
            return ErrorKind::PermissionDenied;
        }
        if NOT_FOUND_CODES.contains(&code) {
            return ErrorKind::NotFound;
        }
        if UNAVAILABLE_CODES.contains(&code) {
            return ErrorKind::Unavailable;
        }
        if code.starts_with("Validation")
            || code.starts_with("InvalidParameter")
            || code.ends_with(".Malformed")
            || code == "InvalidArgument"
            || code == "InvalidBucketName"
        {
            return ErrorKind::InvalidParameters;
        }
    }

    ErrorKind::from_upstream_status(status)
}

/// Map an SDK failure to the normalized taxonomy
///
/// Works for every AWS SDK crate: they all share the same smithy runtime
/// `SdkError` and error-metadata trait.
pub fn map_sdk_error<E>(context: &str, err: SdkError<E>) -> GatewayError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let (kind, message, upstream_status) = match &err {
        SdkError::ServiceError(service_err) => {
            let status = service_err.raw().status().as_u16();
            let code = service_err.err().code();
            let detail = service_err
                .err()
                .message()
                .or(code)
                .unwrap_or("no error details");
            (
                classify_aws_error(code, status),
                format!("{} (HTTP {}): {}", context, status, detail),
                Some(status),
            )
        },
        SdkError::TimeoutError(_) => (
            ErrorKind::Unavailable,
            format!("{}: request timed out", context),
            None,
        ),
        SdkError::DispatchFailure(_) => (
            ErrorKind::Unavailable,
            format!("{}: connection failed", context),
            None,
        ),
        SdkError::ResponseError(_) => (
            ErrorKind::Unavailable,
            format!("{}: response could not be read", context),
            None,
        ),
        _ => (
            ErrorKind::Internal,
            format!("{}: {}", context, DisplayErrorContext(&err)),
            None,
        ),
    };

    tracing::warn!("{}: {}", context, DisplayErrorContext(&err));

    let mapped = GatewayError::new(kind, message).with_cause(err);
    match upstream_status {
        Some(status) => mapped.with_upstream_status(status),
        None => mapped,
    }
}

/// RFC 3339 rendering of an SDK timestamp, `null` when absent
pub fn format_time<'a>(time: impl Into<Option<&'a DateTime>>) -> Value {
    time.into()
        .and_then(|t| t.fmt(Format::DateTime).ok())
        .map(Value::String)
        .unwrap_or(Value::Null)
}

/// Session-aware handle the AWS backends build their clients from
#[derive(Clone)]
pub struct AwsContext {
    sessions: Arc<SessionProvider>,
}

impl AwsContext {
    pub fn new(sessions: Arc<SessionProvider>) -> Self {
        Self { sessions }
    }

    /// Current SDK configuration, resolving the session on first use
    pub async fn sdk_config(&self) -> Result<SdkConfig, GatewayError> {
        let session = self.sessions.aws_session().await?;
        Ok(session.sdk_config().clone())
    }

    /// Drop the cached session when AWS rejected its credentials
    pub async fn observe<T>(&self, outcome: Result<T, GatewayError>) -> Result<T, GatewayError> {
        if let Err(err) = &outcome {
            if err.kind == ErrorKind::AuthenticationFailed && err.upstream_status.is_some() {
                self.sessions.invalidate(BackendFamily::Aws).await;
            }
        }
        outcome
    }
}
