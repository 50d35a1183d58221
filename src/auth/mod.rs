//! Credential/Session Provider
//!
//! Supplies one cached, ready-to-use session per backend family. Sessions are
//! created lazily on first use and refreshed behind a single in-flight
//! resolution per family (see [`cache::SessionCell`]). Adapters only borrow
//! sessions; this module is the sole writer of the cache.
//!
//! # Module Structure
//!
//! - [`cache`] - Coalescing single-writer session cache
//! - [`google`] - Google token sources (token file, ADC)
//! - [`aws`] - AWS credential chain selection and SDK config loading

pub mod aws;
pub mod cache;
pub mod google;

pub use aws::{AwsCredentialSource, AwsSession, AwsSettings, RetryMode};
pub use google::{AdcSource, GoogleCredentialSource, GoogleSession, GoogleToken, TokenFileSource};

use crate::error::GatewayError;
use crate::locator::BackendFamily;
use cache::SessionCell;
use std::sync::Arc;

/// Authenticated handle for one backend family
#[derive(Debug, Clone)]
pub enum Session {
    Aws(Arc<AwsSession>),
    Google(Arc<GoogleSession>),
}

/// Process-wide session cache, one cell per backend family
pub struct SessionProvider {
    google_source: Option<Arc<dyn GoogleCredentialSource>>,
    aws_settings: AwsSettings,
    google: SessionCell<GoogleSession>,
    aws: SessionCell<AwsSession>,
}

impl SessionProvider {
    pub fn new(
        google_source: Option<Arc<dyn GoogleCredentialSource>>,
        aws_settings: AwsSettings,
    ) -> Self {
        Self {
            google_source,
            aws_settings,
            google: SessionCell::new(),
            aws: SessionCell::new(),
        }
    }

    /// Session for `family`, resolving or refreshing it when needed
    pub async fn get_session(&self, family: BackendFamily) -> Result<Session, GatewayError> {
        match family {
            BackendFamily::Aws => self.aws_session().await.map(Session::Aws),
            BackendFamily::Google => self.google_session().await.map(Session::Google),
        }
    }

    pub async fn google_session(&self) -> Result<Arc<GoogleSession>, GatewayError> {
        let Some(source) = self.google_source.as_deref() else {
            return Err(GatewayError::authentication(
                "Google credentials are not configured",
            ));
        };

        self.google
            .get_or_refresh(|_stale| google::resolve_google_session(source))
            .await
    }

    pub async fn aws_session(&self) -> Result<Arc<AwsSession>, GatewayError> {
        self.aws
            .get_or_refresh(|stale| async move {
                if let Some(stale) = stale {
                    tracing::info!("AWS credentials from {} expired, re-resolving", stale.source());
                }
                aws::resolve_aws_session(&self.aws_settings).await
            })
            .await
    }

    /// Forget the cached session after the backend rejected it
    pub async fn invalidate(&self, family: BackendFamily) {
        tracing::warn!("Invalidating cached {} session", family);
        match family {
            BackendFamily::Aws => self.aws.invalidate().await,
            BackendFamily::Google => self.google.invalidate().await,
        }
    }

    pub fn aws_settings(&self) -> &AwsSettings {
        &self.aws_settings
    }
}
