//! Google Client
//!
//! Combines the shared [`SessionProvider`] with [`GoogleHttpClient`]. A 401
//! from Google drops the cached Google session so the next request reloads
//! (and if needed refreshes) the token; the failed call itself is not retried.

use super::http::{Download, GoogleHttpClient};
use crate::auth::SessionProvider;
use crate::error::{ErrorKind, GatewayError};
use crate::locator::BackendFamily;
use serde_json::Value;
use std::sync::Arc;
use url::Url;

pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";
pub const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4";

/// Base URLs of the Google APIs in use
#[derive(Debug, Clone)]
pub struct GoogleEndpoints {
    drive: String,
    sheets: String,
}

impl Default for GoogleEndpoints {
    fn default() -> Self {
        Self {
            drive: DRIVE_API_BASE.to_string(),
            sheets: SHEETS_API_BASE.to_string(),
        }
    }
}

impl GoogleEndpoints {
    /// Point both APIs at one host (used against mock servers)
    pub fn with_root(root: &str) -> Result<Self, GatewayError> {
        let root = Url::parse(root).map_err(|err| {
            GatewayError::invalid_parameters(format!("invalid Google API root '{}'", root))
                .with_cause(err)
        })?;
        let root = root.as_str().trim_end_matches('/');

        Ok(Self {
            drive: format!("{}/drive/v3", root),
            sheets: format!("{}/v4", root),
        })
    }

    pub fn drive_url(&self, path: &str) -> String {
        format!("{}/{}", self.drive, path)
    }

    pub fn sheets_url(&self, path: &str) -> String {
        format!("{}/{}", self.sheets, path)
    }
}

/// Authenticated Google REST client
#[derive(Clone)]
pub struct GoogleClient {
    sessions: Arc<SessionProvider>,
    http: GoogleHttpClient,
    endpoints: GoogleEndpoints,
}

impl GoogleClient {
    pub fn new(sessions: Arc<SessionProvider>) -> Result<Self, GatewayError> {
        Ok(Self {
            sessions,
            http: GoogleHttpClient::new()?,
            endpoints: GoogleEndpoints::default(),
        })
    }

    pub fn with_endpoints(mut self, endpoints: GoogleEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn endpoints(&self) -> &GoogleEndpoints {
        &self.endpoints
    }

    async fn token(&self) -> Result<String, GatewayError> {
        let session = self.sessions.google_session().await?;
        Ok(session.access_token().to_string())
    }

    async fn observe<T>(&self, outcome: Result<T, GatewayError>) -> Result<T, GatewayError> {
        if let Err(err) = &outcome {
            if err.kind == ErrorKind::AuthenticationFailed && err.upstream_status.is_some() {
                self.sessions.invalidate(BackendFamily::Google).await;
            }
        }
        outcome
    }

    /// Make a GET request to a Google API
    pub async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value, GatewayError> {
        let token = self.token().await?;
        let outcome = self.http.get_json(url, &token, query).await;
        self.observe(outcome).await
    }

    /// Download raw content from a Google API
    pub async fn get_bytes(&self, url: &str, query: &[(&str, String)]) -> Result<Download, GatewayError> {
        let token = self.token().await?;
        let outcome = self.http.get_bytes(url, &token, query).await;
        self.observe(outcome).await
    }

    /// Make a PUT request to a Google API
    pub async fn put_json(
        &self,
        url: &str,
        query: &[(&str, String)],
        body: &Value,
    ) -> Result<Value, GatewayError> {
        let token = self.token().await?;
        let outcome = self.http.put_json(url, &token, query, body).await;
        self.observe(outcome).await
    }
}
