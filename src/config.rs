//! Configuration Management
//!
//! Settings are read once at start-up. Precedence, highest first:
//! command-line flag or its environment variable, the YAML config file
//! (`<config_dir>/cloudmux/config.yaml` or `--config`), built-in default.

use crate::auth::{AwsSettings, RetryMode};
use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::Level;

/// Token file used when none is configured
pub const DEFAULT_TOKEN_FILE: &str = "token.json";

const APP_DIR: &str = "cloudmux";

/// Verbosity of the log file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

/// Where Google access tokens come from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GoogleAuthMode {
    /// Authorized-user JSON written by the OAuth setup flow
    #[default]
    TokenFile,
    /// Application default credentials
    Adc,
}

/// Command-line options, each with an environment fallback
#[derive(Args, Debug, Clone, Default)]
pub struct GatewayArgs {
    /// YAML config file
    #[arg(long, env = "CLOUDMUX_CONFIG")]
    pub config: Option<PathBuf>,

    /// AWS region
    #[arg(long, env = "AWS_REGION")]
    pub region: Option<String>,

    /// Region used when `--region`/`AWS_REGION` is unset
    #[arg(long, env = "AWS_DEFAULT_REGION", hide = true)]
    pub default_region: Option<String>,

    /// AWS access key id
    #[arg(long, env = "AWS_ACCESS_KEY_ID", hide_env_values = true)]
    pub access_key_id: Option<String>,

    /// AWS secret access key
    #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
    pub secret_access_key: Option<String>,

    /// AWS session token
    #[arg(long, env = "AWS_SESSION_TOKEN", hide_env_values = true)]
    pub session_token: Option<String>,

    /// AWS named profile
    #[arg(long, env = "AWS_PROFILE")]
    pub profile: Option<String>,

    /// AWS shared credentials file
    #[arg(long, env = "AWS_SHARED_CREDENTIALS_FILE")]
    pub shared_credentials_file: Option<PathBuf>,

    /// AWS SDK retry mode (standard, adaptive)
    #[arg(long, env = "AWS_RETRY_MODE")]
    pub retry_mode: Option<RetryMode>,

    /// AWS SDK max attempts per request
    #[arg(long, env = "AWS_MAX_ATTEMPTS")]
    pub max_attempts: Option<u32>,

    /// AWS endpoint override (LocalStack, MinIO)
    #[arg(long, env = "AWS_ENDPOINT_URL")]
    pub endpoint_url: Option<String>,

    /// Google authorized-user token file
    #[arg(long, env = "GOOGLE_TOKEN_FILE")]
    pub google_token_file: Option<PathBuf>,

    /// Google credential source
    #[arg(long, env = "GOOGLE_AUTH_MODE", value_enum)]
    pub google_auth_mode: Option<GoogleAuthMode>,

    /// Log level for debugging
    #[arg(long, env = "CLOUDMUX_LOG_LEVEL", value_enum)]
    pub log_level: Option<LogLevel>,

    /// Log file
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AwsFileConfig {
    pub region: Option<String>,
    pub profile: Option<String>,
    pub shared_credentials_file: Option<PathBuf>,
    pub retry_mode: Option<RetryMode>,
    pub max_attempts: Option<u32>,
    pub endpoint_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GoogleFileConfig {
    pub auth_mode: Option<GoogleAuthMode>,
    pub token_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogFileConfig {
    pub level: Option<LogLevel>,
    pub file: Option<PathBuf>,
}

/// Contents of the YAML config file; secrets are never read from it
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub aws: AwsFileConfig,
    pub google: GoogleFileConfig,
    pub log: LogFileConfig,
}

impl FileConfig {
    pub fn parse(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).context("invalid config file")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoogleConfig {
    pub auth_mode: GoogleAuthMode,
    pub token_file: PathBuf,
}

/// Effective, immutable gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub aws: AwsSettings,
    pub google: GoogleConfig,
    pub log_level: LogLevel,
    pub log_file: PathBuf,
}

impl GatewayConfig {
    /// Read the config file (if any) and merge it under `args`
    pub fn load(args: &GatewayArgs) -> Result<Self> {
        let file = match &args.config {
            Some(path) => read_config_file(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => read_config_file(&path)?,
                _ => FileConfig::default(),
            },
        };
        Ok(Self::resolve(args, file))
    }

    /// Apply precedence without touching the filesystem
    pub fn resolve(args: &GatewayArgs, file: FileConfig) -> Self {
        let FileConfig { aws, google, log } = file;

        let region = args
            .region
            .clone()
            .or_else(|| args.default_region.clone())
            .or(aws.region)
            .unwrap_or_else(|| crate::auth::aws::DEFAULT_REGION.to_string());

        let aws = AwsSettings {
            region,
            access_key_id: args.access_key_id.clone(),
            secret_access_key: args.secret_access_key.clone(),
            session_token: args.session_token.clone(),
            profile: args.profile.clone().or(aws.profile),
            shared_credentials_file: args
                .shared_credentials_file
                .clone()
                .or(aws.shared_credentials_file),
            retry_mode: args.retry_mode.or(aws.retry_mode),
            max_attempts: args.max_attempts.or(aws.max_attempts),
            endpoint_url: args.endpoint_url.clone().or(aws.endpoint_url),
        };

        let google = GoogleConfig {
            auth_mode: args.google_auth_mode.or(google.auth_mode).unwrap_or_default(),
            token_file: args
                .google_token_file
                .clone()
                .or(google.token_file)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_TOKEN_FILE)),
        };

        Self {
            aws,
            google,
            log_level: args.log_level.or(log.level).unwrap_or_default(),
            log_file: args.log_file.clone().or(log.file).unwrap_or_else(default_log_path),
        }
    }
}

fn read_config_file(path: &Path) -> Result<FileConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    FileConfig::parse(&content).with_context(|| format!("in {}", path.display()))
}

/// `<config_dir>/cloudmux/config.yaml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join(APP_DIR).join("config.yaml"))
}

pub fn default_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join(APP_DIR).join("cloudmux.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".cloudmux").join("cloudmux.log");
    }
    PathBuf::from("cloudmux.log")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::resolve(&GatewayArgs::default(), FileConfig::default());
        assert_eq!(config.aws.region, "us-east-1");
        assert_eq!(config.google.auth_mode, GoogleAuthMode::TokenFile);
        assert_eq!(config.google.token_file, PathBuf::from("token.json"));
        assert_eq!(config.log_level, LogLevel::Warn);
    }

    #[test]
    fn test_flags_override_file() {
        let file = FileConfig::parse(
            "aws:\n  region: eu-west-1\n  profile: dev\n  retry_mode: adaptive\nlog:\n  level: debug\n",
        )
        .unwrap();
        let args = GatewayArgs {
            region: Some("ap-south-1".to_string()),
            ..Default::default()
        };

        let config = GatewayConfig::resolve(&args, file);
        assert_eq!(config.aws.region, "ap-south-1");
        assert_eq!(config.aws.profile.as_deref(), Some("dev"));
        assert_eq!(config.aws.retry_mode, Some(RetryMode::Adaptive));
        assert_eq!(config.log_level, LogLevel::Debug);
    }

    #[test]
    fn test_region_precedence() {
        let file = FileConfig::parse("aws:\n  region: eu-west-1\n").unwrap();

        let args = GatewayArgs {
            default_region: Some("eu-central-1".to_string()),
            ..Default::default()
        };
        let config = GatewayConfig::resolve(&args, file.clone());
        assert_eq!(config.aws.region, "eu-central-1");

        let args = GatewayArgs {
            region: Some("sa-east-1".to_string()),
            default_region: Some("eu-central-1".to_string()),
            ..Default::default()
        };
        assert_eq!(GatewayConfig::resolve(&args, file).aws.region, "sa-east-1");
    }

    #[test]
    fn test_region_env_variables() {
        use clap::{CommandFactory, Parser};

        #[derive(Parser)]
        struct Cli {
            #[command(flatten)]
            args: GatewayArgs,
        }

        let command = Cli::command();
        let env_of = |id: &str| {
            command
                .get_arguments()
                .find(|arg| arg.get_id() == id)
                .and_then(|arg| arg.get_env())
                .map(|env| env.to_string_lossy().into_owned())
        };
        assert_eq!(env_of("region").as_deref(), Some("AWS_REGION"));
        assert_eq!(env_of("default_region").as_deref(), Some("AWS_DEFAULT_REGION"));

        let cli = Cli::try_parse_from(["cloudmux", "--region", "us-west-1"]).unwrap();
        assert_eq!(cli.args.region.as_deref(), Some("us-west-1"));
    }

    #[test]
    fn test_google_section() {
        let file = FileConfig::parse("google:\n  auth_mode: adc\n  token_file: /tmp/t.json\n").unwrap();
        let config = GatewayConfig::resolve(&GatewayArgs::default(), file);
        assert_eq!(config.google.auth_mode, GoogleAuthMode::Adc);
        assert_eq!(config.google.token_file, PathBuf::from("/tmp/t.json"));
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(FileConfig::parse("aws:\n  secret_access_key: nope\n").is_err());
        assert!(FileConfig::parse("").is_ok());
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "aws:\n  region: us-west-2").unwrap();

        let args = GatewayArgs {
            config: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        let config = GatewayConfig::load(&args).unwrap();
        assert_eq!(config.aws.region, "us-west-2");
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let args = GatewayArgs {
            config: Some(PathBuf::from("/nonexistent/cloudmux.yaml")),
            ..Default::default()
        };
        assert!(GatewayConfig::load(&args).is_err());
    }
}
