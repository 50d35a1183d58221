//! HTTP utilities for Google REST API calls

use crate::error::{ErrorKind, GatewayError};
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use std::time::Duration;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Maximum length of a Google error message echoed to callers
const MAX_ERROR_MESSAGE_LENGTH: usize = 200;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Truncate and strip control characters before logging a response body
pub(crate) fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let cut = floor_char_boundary(body, MAX_LOG_BODY_LENGTH);
        format!("{}... [truncated, {} bytes total]", &body[..cut], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Human-readable error for a non-success Google response
///
/// Google wraps failures as `{"error": {"code", "message", "status"}}`; the
/// message is kept (truncated) since it names the offending range or file.
pub(crate) fn google_error(status: u16, body: &str) -> GatewayError {
    let kind = ErrorKind::from_upstream_status(status);

    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .map(|m| {
            m.chars()
                .filter(|c| !c.is_control())
                .take(MAX_ERROR_MESSAGE_LENGTH)
                .collect::<String>()
        });

    let message = match (kind, detail) {
        (_, Some(detail)) if !detail.is_empty() => {
            format!("Google API request failed ({}): {}", status, detail)
        },
        (ErrorKind::AuthenticationFailed, _) => {
            "Google rejected the access token. Re-authorize and try again.".to_string()
        },
        (ErrorKind::PermissionDenied, _) => {
            "Permission denied. Check the sharing settings and granted scopes.".to_string()
        },
        (ErrorKind::NotFound, _) => "Resource not found.".to_string(),
        (ErrorKind::Unavailable, _) => {
            "Google service temporarily unavailable. Please try again.".to_string()
        },
        _ => format!("Google API request failed ({})", status),
    };

    GatewayError::new(kind, message).with_upstream_status(status)
}

/// Transport failures: connection refused, timeouts and aborted bodies are
/// all the backend being unavailable
pub(crate) fn transport_error(context: &str, err: reqwest::Error) -> GatewayError {
    let message = if err.is_timeout() {
        format!("{}: request timed out", context)
    } else if err.is_connect() {
        format!("{}: connection failed", context)
    } else {
        format!("{}: request failed", context)
    };
    GatewayError::unavailable(message).with_cause(err)
}

/// Raw downloaded body
#[derive(Debug, Clone)]
pub struct Download {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// HTTP client wrapper for Google API calls
#[derive(Clone)]
pub struct GoogleHttpClient {
    client: Client,
}

impl GoogleHttpClient {
    /// Create a new HTTP client
    pub fn new() -> Result<Self, GatewayError> {
        let client = Client::builder()
            .user_agent(concat!("cloudmux/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| GatewayError::internal("Failed to create HTTP client").with_cause(err))?;

        Ok(Self { client })
    }

    /// Wrap an existing client
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    async fn send(&self, method: &str, url: &str, request: RequestBuilder) -> Result<Response, GatewayError> {
        tracing::debug!("{} {}", method, url);

        let response = request
            .send()
            .await
            .map_err(|err| transport_error("Google API", err))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        // Security: Only log sanitized/truncated error body to avoid leaking sensitive data
        tracing::error!("API error: {} - {}", status, sanitize_for_log(&body));
        Err(google_error(status.as_u16(), &body))
    }

    async fn json_body(response: Response) -> Result<Value, GatewayError> {
        let body = response
            .text()
            .await
            .map_err(|err| transport_error("Google API response", err))?;

        // Handle empty response
        if body.is_empty() {
            return Ok(Value::Null);
        }

        Ok(serde_json::from_str(&body)?)
    }

    /// GET returning JSON
    pub async fn get_json(
        &self,
        url: &str,
        token: &str,
        query: &[(&str, String)],
    ) -> Result<Value, GatewayError> {
        let request = self.client.get(url).bearer_auth(token).query(query);
        let response = self.send("GET", url, request).await?;
        Self::json_body(response).await
    }

    /// GET returning raw bytes
    pub async fn get_bytes(
        &self,
        url: &str,
        token: &str,
        query: &[(&str, String)],
    ) -> Result<Download, GatewayError> {
        let request = self.client.get(url).bearer_auth(token).query(query);
        let response = self.send("GET", url, request).await?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let bytes = response
            .bytes()
            .await
            .map_err(|err| transport_error("Google download", err))?;

        Ok(Download {
            bytes: bytes.to_vec(),
            content_type,
        })
    }

    /// PUT a JSON body
    pub async fn put_json(
        &self,
        url: &str,
        token: &str,
        query: &[(&str, String)],
        body: &Value,
    ) -> Result<Value, GatewayError> {
        let request = self.client.put(url).bearer_auth(token).query(query).json(body);
        let response = self.send("PUT", url, request).await?;
        Self::json_body(response).await
    }
}
