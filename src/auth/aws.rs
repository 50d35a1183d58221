//! AWS Authentication
//!
//! Credential source selection is a pure function over [`AwsSettings`]; the
//! chosen source is then handed to `aws-config` which builds the shared
//! [`SdkConfig`] every AWS backend clones its client from.

use super::cache::Expiring;
use crate::error::GatewayError;
use aws_config::profile::profile_file::{ProfileFileKind, ProfileFiles};
use aws_config::profile::ProfileFileCredentialsProvider;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_credential_types::provider::ProvideCredentials;
use aws_credential_types::Credentials;
use aws_smithy_types::error::display::DisplayErrorContext;
use aws_smithy_types::retry::RetryConfig;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{Duration, SystemTime};

/// Region used when none is configured
pub const DEFAULT_REGION: &str = "us-east-1";

/// Re-resolve credentials this long before they expire
const CREDENTIAL_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

const STATIC_PROVIDER_NAME: &str = "cloudmux-static";

/// SDK retry strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryMode {
    Standard,
    Adaptive,
}

impl FromStr for RetryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "standard" | "legacy" => Ok(RetryMode::Standard),
            "adaptive" => Ok(RetryMode::Adaptive),
            other => Err(format!("unknown retry mode '{}'", other)),
        }
    }
}

/// AWS inputs read once at start-up
#[derive(Clone, Default)]
pub struct AwsSettings {
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    pub profile: Option<String>,
    pub shared_credentials_file: Option<PathBuf>,
    pub retry_mode: Option<RetryMode>,
    pub max_attempts: Option<u32>,
    pub endpoint_url: Option<String>,
}

impl AwsSettings {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            ..Default::default()
        }
    }

    fn region(&self) -> &str {
        if self.region.is_empty() {
            DEFAULT_REGION
        } else {
            &self.region
        }
    }
}

// Security: never print secret material
impl fmt::Debug for AwsSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsSettings")
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id.as_ref().map(|_| "<set>"))
            .field("secret_access_key", &self.secret_access_key.as_ref().map(|_| "<redacted>"))
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .field("profile", &self.profile)
            .field("shared_credentials_file", &self.shared_credentials_file)
            .field("retry_mode", &self.retry_mode)
            .field("max_attempts", &self.max_attempts)
            .field("endpoint_url", &self.endpoint_url)
            .finish()
    }
}

/// Which link of the credential chain supplied the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AwsCredentialSource {
    /// Access key id + secret
    ExplicitKeys,
    /// Access key id + secret + session token
    SessionToken,
    /// Named profile from the shared config/credentials files
    Profile(String),
    /// Default profile of an explicitly named credentials file
    SharedCredentialsFile(PathBuf),
    /// SDK default chain (environment, web identity, container, instance metadata)
    Environment,
}

impl fmt::Display for AwsCredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AwsCredentialSource::ExplicitKeys => f.write_str("explicit keys"),
            AwsCredentialSource::SessionToken => f.write_str("session token"),
            AwsCredentialSource::Profile(name) => write!(f, "profile '{}'", name),
            AwsCredentialSource::SharedCredentialsFile(path) => {
                write!(f, "credentials file {}", path.display())
            },
            AwsCredentialSource::Environment => f.write_str("default chain"),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// First fully specified source, in chain order
///
/// Partially specified static keys are rejected instead of being completed
/// from another link of the chain.
pub fn select_aws_source(settings: &AwsSettings) -> Result<AwsCredentialSource, GatewayError> {
    let key_id = non_empty(&settings.access_key_id);
    let secret = non_empty(&settings.secret_access_key);
    let token = non_empty(&settings.session_token);

    match (key_id, secret, token) {
        (Some(_), Some(_), None) => return Ok(AwsCredentialSource::ExplicitKeys),
        (Some(_), Some(_), Some(_)) => return Ok(AwsCredentialSource::SessionToken),
        (Some(_), None, _) => {
            return Err(GatewayError::authentication(
                "AWS access key id is set without a secret access key",
            ))
        },
        (None, Some(_), _) => {
            return Err(GatewayError::authentication(
                "AWS secret access key is set without an access key id",
            ))
        },
        (None, None, Some(_)) => {
            return Err(GatewayError::authentication(
                "AWS session token is set without an access key pair",
            ))
        },
        (None, None, None) => {},
    }

    if let Some(profile) = non_empty(&settings.profile) {
        return Ok(AwsCredentialSource::Profile(profile.to_string()));
    }

    if let Some(path) = &settings.shared_credentials_file {
        return Ok(AwsCredentialSource::SharedCredentialsFile(path.clone()));
    }

    Ok(AwsCredentialSource::Environment)
}

/// Resolved AWS configuration shared by all AWS backends
#[derive(Clone)]
pub struct AwsSession {
    config: SdkConfig,
    source: AwsCredentialSource,
    expires_at: Option<SystemTime>,
}

impl AwsSession {
    pub fn sdk_config(&self) -> &SdkConfig {
        &self.config
    }

    pub fn source(&self) -> &AwsCredentialSource {
        &self.source
    }

    pub fn region(&self) -> Option<&str> {
        self.config.region().map(|r| r.as_ref())
    }

    pub fn expires_at(&self) -> Option<SystemTime> {
        self.expires_at
    }
}

impl Expiring for AwsSession {
    fn is_valid(&self) -> bool {
        match self.expires_at {
            Some(expiry) => SystemTime::now() + CREDENTIAL_EXPIRY_BUFFER < expiry,
            None => true,
        }
    }
}

impl fmt::Debug for AwsSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsSession")
            .field("source", &self.source)
            .field("region", &self.region())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

fn profile_provider(name: &str, credentials_file: Option<&Path>) -> ProfileFileCredentialsProvider {
    let mut builder = ProfileFileCredentialsProvider::builder().profile_name(name);
    if let Some(path) = credentials_file {
        builder = builder.profile_files(
            ProfileFiles::builder()
                .include_default_config_file(true)
                .with_file(ProfileFileKind::Credentials, path)
                .build(),
        );
    }
    builder.build()
}

fn retry_config(settings: &AwsSettings) -> Option<RetryConfig> {
    if settings.retry_mode.is_none() && settings.max_attempts.is_none() {
        return None;
    }

    let mut config = match settings.retry_mode {
        Some(RetryMode::Adaptive) => RetryConfig::adaptive(),
        _ => RetryConfig::standard(),
    };
    if let Some(max_attempts) = settings.max_attempts {
        config = config.with_max_attempts(max_attempts.max(1));
    }
    Some(config)
}

/// Build a session from `settings` and resolve its credentials once
pub async fn resolve_aws_session(settings: &AwsSettings) -> Result<AwsSession, GatewayError> {
    let source = select_aws_source(settings)?;
    tracing::info!("Resolving AWS credentials from {}", source);

    let mut loader =
        aws_config::defaults(BehaviorVersion::latest()).region(Region::new(settings.region().to_string()));

    match &source {
        AwsCredentialSource::ExplicitKeys | AwsCredentialSource::SessionToken => {
            let credentials = Credentials::new(
                non_empty(&settings.access_key_id).unwrap_or_default(),
                non_empty(&settings.secret_access_key).unwrap_or_default(),
                non_empty(&settings.session_token).map(str::to_string),
                None,
                STATIC_PROVIDER_NAME,
            );
            loader = loader.credentials_provider(credentials);
        },
        AwsCredentialSource::Profile(name) => {
            loader = loader.credentials_provider(profile_provider(
                name,
                settings.shared_credentials_file.as_deref(),
            ));
        },
        AwsCredentialSource::SharedCredentialsFile(path) => {
            loader = loader.credentials_provider(profile_provider("default", Some(path)));
        },
        AwsCredentialSource::Environment => {},
    }

    if let Some(retry) = retry_config(settings) {
        loader = loader.retry_config(retry);
    }
    if let Some(endpoint) = non_empty(&settings.endpoint_url) {
        loader = loader.endpoint_url(endpoint);
    }

    let config = loader.load().await;
    let credentials = load_credentials(&config).await?;

    tracing::debug!(
        "AWS credentials resolved (region={}, expiring={})",
        settings.region(),
        credentials.expiry().is_some()
    );

    Ok(AwsSession {
        config,
        source,
        expires_at: credentials.expiry(),
    })
}

async fn load_credentials(config: &SdkConfig) -> Result<Credentials, GatewayError> {
    let provider = config
        .credentials_provider()
        .ok_or_else(|| GatewayError::authentication("no AWS credentials provider available"))?;

    provider.provide_credentials().await.map_err(|err| {
        GatewayError::authentication(format!(
            "AWS credential resolution failed: {}",
            DisplayErrorContext(&err)
        ))
        .with_cause(err)
    })
}
