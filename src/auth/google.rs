//! Google Authentication
//!
//! Google sessions come from an injectable [`GoogleCredentialSource`]:
//! - [`TokenFileSource`] - authorized-user token file, refreshed through the
//!   OAuth token endpoint and written back in place
//! - [`AdcSource`] - Application Default Credentials via `gcp_auth`
//!
//! Acquiring a first token (the browser consent flow) is not done here; when
//! no usable token exists the caller is told that authorization is required.

use super::cache::Expiring;
use crate::error::{ErrorKind, GatewayError};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use gcp_auth::TokenProvider;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Scopes needed by the Drive and Sheets adapters
pub const GOOGLE_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/drive.readonly",
    "https://www.googleapis.com/auth/spreadsheets",
];

/// OAuth token endpoint used when the token file does not name one
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Treat tokens as expired this long before their actual expiry
const TOKEN_EXPIRY_BUFFER_SECS: i64 = 60;

/// TTL assumed for ADC tokens (conservative: 30 minutes)
const DEFAULT_TOKEN_TTL_SECS: i64 = 30 * 60;

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// Persisted authorized-user token
#[derive(Clone, Serialize, Deserialize)]
pub struct GoogleToken {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
    /// Fields written by other tools, preserved on re-persist
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GoogleToken {
    pub fn new(token: impl Into<String>, expiry: Option<DateTime<Utc>>) -> Self {
        Self {
            token: token.into(),
            refresh_token: None,
            token_uri: default_token_uri(),
            client_id: None,
            client_secret: None,
            scopes: GOOGLE_SCOPES.iter().map(|s| s.to_string()).collect(),
            expiry,
            extra: Map::new(),
        }
    }

    /// Expired or about to expire at `now`; tokens without expiry never expire
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => now + Duration::seconds(TOKEN_EXPIRY_BUFFER_SECS) >= expiry,
            None => false,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

// Security: never print token material
impl fmt::Debug for GoogleToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleToken")
            .field("token", &"<redacted>")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("token_uri", &self.token_uri)
            .field("expiry", &self.expiry)
            .finish()
    }
}

/// Ready-to-use Google bearer credentials
#[derive(Clone)]
pub struct GoogleSession {
    access_token: String,
    expires_at: Option<DateTime<Utc>>,
}

impl GoogleSession {
    pub fn from_token(token: &GoogleToken) -> Self {
        Self {
            access_token: token.token.clone(),
            expires_at: token.expiry,
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }
}

impl Expiring for GoogleSession {
    fn is_valid(&self) -> bool {
        match self.expires_at {
            Some(expiry) => Utc::now() + Duration::seconds(TOKEN_EXPIRY_BUFFER_SECS) < expiry,
            None => true,
        }
    }
}

impl fmt::Debug for GoogleSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleSession")
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Where Google tokens come from and go back to
#[async_trait]
pub trait GoogleCredentialSource: Send + Sync {
    /// Short label for logs
    fn describe(&self) -> String;

    /// Current persisted token, `None` when nothing was ever authorized
    async fn load(&self) -> Result<Option<GoogleToken>, GatewayError>;

    /// Whether `token` can be renewed without user interaction
    fn can_refresh(&self, token: &GoogleToken) -> bool {
        token.refresh_token.is_some()
    }

    /// Exchange an expired token for a fresh one
    async fn refresh(&self, token: &GoogleToken) -> Result<GoogleToken, GatewayError>;

    /// Write a refreshed token back
    async fn persist(&self, token: &GoogleToken) -> Result<(), GatewayError>;
}

fn authorization_required(source: &dyn GoogleCredentialSource) -> GatewayError {
    GatewayError::authentication(format!(
        "Google authorization required: no valid token in {}. Complete the OAuth consent flow first",
        source.describe()
    ))
}

/// Load, refresh if needed, persist, and hand out a session
pub async fn resolve_google_session(
    source: &dyn GoogleCredentialSource,
) -> Result<GoogleSession, GatewayError> {
    let Some(token) = source.load().await? else {
        return Err(authorization_required(source));
    };

    if !token.is_expired() {
        tracing::debug!("Using persisted Google token from {}", source.describe());
        return Ok(GoogleSession::from_token(&token));
    }

    if !source.can_refresh(&token) {
        tracing::warn!("Google token expired and cannot be refreshed");
        return Err(authorization_required(source));
    }

    tracing::info!("Google token expired, refreshing via {}", source.describe());
    let fresh = source.refresh(&token).await?;

    if let Err(err) = source.persist(&fresh).await {
        tracing::warn!("Refreshed Google token could not be persisted: {}", err);
    }

    Ok(GoogleSession::from_token(&fresh))
}

/// OAuth token endpoint response
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

/// Authorized-user token stored as JSON on disk
pub struct TokenFileSource {
    path: PathBuf,
    http: reqwest::Client,
}

impl TokenFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            http: reqwest::Client::new(),
        }
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl GoogleCredentialSource for TokenFileSource {
    fn describe(&self) -> String {
        format!("token file {}", self.path.display())
    }

    async fn load(&self) -> Result<Option<GoogleToken>, GatewayError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(GatewayError::internal(format!(
                    "failed to read {}",
                    self.path.display()
                ))
                .with_cause(err))
            },
        };

        let token: GoogleToken = serde_json::from_str(&content).map_err(|err| {
            GatewayError::authentication(format!(
                "{} is not a valid authorized-user token",
                self.path.display()
            ))
            .with_cause(err)
        })?;

        Ok(Some(token))
    }

    async fn refresh(&self, token: &GoogleToken) -> Result<GoogleToken, GatewayError> {
        let (Some(refresh_token), Some(client_id), Some(client_secret)) = (
            token.refresh_token.as_deref(),
            token.client_id.as_deref(),
            token.client_secret.as_deref(),
        ) else {
            return Err(GatewayError::authentication(
                "token file lacks refresh_token, client_id or client_secret",
            ));
        };

        tracing::debug!("POST {}", token.token_uri);

        let response = self
            .http
            .post(&token.token_uri)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", client_id),
                ("client_secret", client_secret),
            ])
            .send()
            .await
            .map_err(|err| {
                GatewayError::authentication(format!(
                    "Google token refresh failed: {} unreachable",
                    token.token_uri
                ))
                .with_cause(err)
            })?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            // Security: the error body may echo the refresh token, do not log it
            let kind = match ErrorKind::from_upstream_status(status) {
                ErrorKind::InvalidParameters
                | ErrorKind::AuthenticationFailed
                | ErrorKind::PermissionDenied => ErrorKind::AuthenticationFailed,
                other => other,
            };
            return Err(GatewayError::new(
                kind,
                format!("Google token refresh rejected with HTTP {}", status),
            )
            .with_upstream_status(status));
        }

        let body: RefreshResponse = response.json().await.map_err(|err| {
            GatewayError::internal("malformed OAuth token response").with_cause(err)
        })?;

        let mut fresh = token.clone();
        fresh.token = body.access_token;
        fresh.expiry = body
            .expires_in
            .map(|secs| Utc::now() + Duration::seconds(secs));
        if let Some(rotated) = body.refresh_token {
            fresh.refresh_token = Some(rotated);
        }
        if let Some(scope) = body.scope {
            fresh.scopes = scope.split_whitespace().map(str::to_string).collect();
        }

        Ok(fresh)
    }

    async fn persist(&self, token: &GoogleToken) -> Result<(), GatewayError> {
        let content = serde_json::to_string_pretty(token)?;
        let staging = self.path.with_extension("json.tmp");

        write_private(&staging, content.as_bytes())
            .await
            .map_err(|err| {
                GatewayError::internal(format!("failed to write {}", staging.display()))
                    .with_cause(err)
            })?;

        tokio::fs::rename(&staging, &self.path).await.map_err(|err| {
            GatewayError::internal(format!("failed to replace {}", self.path.display()))
                .with_cause(err)
        })?;

        tracing::info!("Refreshed Google token written to {}", self.path.display());
        Ok(())
    }
}

/// Token files hold secrets: owner read/write only, from creation on
async fn write_private(path: &Path, content: &[u8]) -> std::io::Result<()> {
    use tokio::io::AsyncWriteExt;

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);
    let mut file = options.open(path).await?;

    // A stale file left by an earlier run keeps its old mode when reopened
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600)).await?;
    }

    file.write_all(content).await?;
    file.flush().await?;
    Ok(())
}

/// Application Default Credentials (service account, gcloud user, metadata server)
#[derive(Default)]
pub struct AdcSource {
    provider: OnceCell<Arc<dyn TokenProvider>>,
}

impl AdcSource {
    pub fn new() -> Self {
        Self::default()
    }

    async fn provider(&self) -> Result<&Arc<dyn TokenProvider>, GatewayError> {
        self.provider
            .get_or_try_init(|| async {
                gcp_auth::provider().await.map_err(|err| {
                    GatewayError::authentication(
                        "Failed to initialize Google application default credentials. \
                         Run 'gcloud auth application-default login'",
                    )
                    .with_cause(err)
                })
            })
            .await
    }
}

#[async_trait]
impl GoogleCredentialSource for AdcSource {
    fn describe(&self) -> String {
        "application default credentials".to_string()
    }

    async fn load(&self) -> Result<Option<GoogleToken>, GatewayError> {
        let provider = self.provider().await?;
        let token = provider.token(GOOGLE_SCOPES).await.map_err(|err| {
            GatewayError::authentication("Failed to get Google access token").with_cause(err)
        })?;

        // gcp_auth caches and renews on its own, so assume a conservative TTL
        let expiry = Utc::now() + Duration::seconds(DEFAULT_TOKEN_TTL_SECS);
        Ok(Some(GoogleToken::new(token.as_str(), Some(expiry))))
    }

    fn can_refresh(&self, _token: &GoogleToken) -> bool {
        true
    }

    async fn refresh(&self, _token: &GoogleToken) -> Result<GoogleToken, GatewayError> {
        self.load()
            .await?
            .ok_or_else(|| GatewayError::authentication("application default credentials returned no token"))
    }

    async fn persist(&self, _token: &GoogleToken) -> Result<(), GatewayError> {
        Ok(())
    }
}
