use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cloudmux::config::{GatewayArgs, GatewayConfig};
use cloudmux::mcp::{tools, McpServer};
use std::path::Path;
use std::sync::Arc;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

/// MCP gateway for Google Drive, Google Sheets and AWS
#[derive(Parser, Debug)]
#[command(name = "cloudmux", version = cloudmux::VERSION, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    gateway: GatewayArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve MCP over stdin/stdout (default)
    Serve,
    /// Print the tool catalogue as JSON
    Tools,
}

fn setup_logging(config: &GatewayConfig) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = config.log_level.to_tracing_level() else {
        return Ok(None);
    };

    let log_path: &Path = &config.log_file;
    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("failed to open log file {}", log_path.display()))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    // RUST_LOG narrows per-target levels; the configured level stays the ceiling
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(tracing_level).into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("cloudmux {} started with log level: {:?}", cloudmux::VERSION, config.log_level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = GatewayConfig::load(&cli.gateway)?;

    let _log_guard = setup_logging(&config)?;
    tracing::debug!("Configuration: {:?}", config);

    let endpoints = cloudmux::build_endpoints(&config).context("failed to initialize adapters")?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let server = Arc::new(McpServer::new(endpoints));
            server.run_stdio().await?;
        },
        Command::Tools => {
            let catalogue = tools::list_tools(endpoints.router().registry());
            println!("{}", serde_json::to_string_pretty(&catalogue)?);
        },
    }

    Ok(())
}
