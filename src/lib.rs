//! cloudmux - one resource locator scheme over Google Drive, Google Sheets
//! and AWS services, served as an MCP gateway.
//!
//! A request flows leaf-first through:
//!
//! - [`handlers`] - shape validation, locator construction, response envelope
//! - [`dispatch`] - scheme to adapter routing over an immutable registry
//! - [`adapters`] - one adapter per scheme, the only place backend errors are known
//! - [`auth`] - cached, coalesced sessions per backend family

pub mod adapters;
pub mod auth;
pub mod aws;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod google;
pub mod handlers;
pub mod locator;
pub mod mcp;

use adapters::cloudwatch::{CloudWatchAdapter, CloudWatchBackend, SdkCloudWatchBackend};
use adapters::cloudwatch_logs::SdkLogsBackend;
use adapters::dynamodb::{DynamoDbAdapter, SdkDynamoDbBackend};
use adapters::ec2::{Ec2Adapter, SdkEc2Backend};
use adapters::gdrive::{DriveAdapter, RestDriveBackend};
use adapters::gsheets::{RestSheetsBackend, SheetsAdapter};
use adapters::iam::{IamAdapter, SdkIamBackend};
use adapters::lambda::{LambdaAdapter, SdkLambdaBackend};
use adapters::s3::{S3Adapter, SdkS3Backend};
use auth::{AdcSource, GoogleCredentialSource, SessionProvider, TokenFileSource};
use config::{GatewayConfig, GoogleAuthMode};
use dispatch::{AdapterRegistry, Router};
use error::GatewayError;
use google::GoogleClient;
use handlers::Endpoints;
use std::sync::Arc;

/// Version injected at compile time via CLOUDMUX_VERSION env var (set by CI/CD),
/// or the crate version for local builds.
pub const VERSION: &str = match option_env!("CLOUDMUX_VERSION") {
    Some(v) => v,
    None => env!("CARGO_PKG_VERSION"),
};

/// Session provider for the configured credential sources
pub fn build_sessions(config: &GatewayConfig) -> Arc<SessionProvider> {
    let google: Arc<dyn GoogleCredentialSource> = match config.google.auth_mode {
        GoogleAuthMode::TokenFile => Arc::new(TokenFileSource::new(&config.google.token_file)),
        GoogleAuthMode::Adc => Arc::new(AdcSource::new()),
    };
    Arc::new(SessionProvider::new(Some(google), config.aws.clone()))
}

/// Registry with every adapter wired to its real backend
pub fn build_registry(sessions: &Arc<SessionProvider>) -> Result<AdapterRegistry, GatewayError> {
    let aws = aws::AwsContext::new(Arc::clone(sessions));

    let drive = RestDriveBackend::new(GoogleClient::new(Arc::clone(sessions))?);
    let sheets = RestSheetsBackend::new(GoogleClient::new(Arc::clone(sessions))?);

    let metrics: Arc<dyn CloudWatchBackend> = Arc::new(SdkCloudWatchBackend::new(aws.clone()));
    let logs = Arc::new(SdkLogsBackend::new(aws.clone()));

    let registry = AdapterRegistry::builder()
        .register(Arc::new(DriveAdapter::new(Arc::new(drive))))
        .register(Arc::new(SheetsAdapter::new(Arc::new(sheets))))
        .register(Arc::new(S3Adapter::new(Arc::new(SdkS3Backend::new(aws.clone())))))
        .register(Arc::new(DynamoDbAdapter::new(Arc::new(SdkDynamoDbBackend::new(aws.clone())))))
        .register(Arc::new(CloudWatchAdapter::new(Arc::clone(&metrics), logs)))
        .register(Arc::new(LambdaAdapter::new(Arc::new(SdkLambdaBackend::new(aws.clone())), metrics)))
        .register(Arc::new(Ec2Adapter::new(Arc::new(SdkEc2Backend::new(aws.clone())))))
        .register(Arc::new(IamAdapter::new(Arc::new(SdkIamBackend::new(aws)))))
        .build();

    tracing::info!("Registered {} adapters", registry.len());
    Ok(registry)
}

/// Endpoint surface for `config`
pub fn build_endpoints(config: &GatewayConfig) -> Result<Endpoints, GatewayError> {
    let sessions = build_sessions(config);
    let registry = build_registry(&sessions)?;
    Ok(Endpoints::new(Router::new(registry)))
}
