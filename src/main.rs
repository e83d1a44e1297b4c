#![forbid(unsafe_code)]

//! `agent-conduit` — session-protocol adapter binary.
//!
//! Bootstraps configuration and logging, then serves the client protocol
//! over stdio. Logging goes to stderr; stdout carries the protocol.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use agent_conduit::config::ConduitConfig;
use agent_conduit::server;
use agent_conduit::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "agent-conduit", about = "Session-protocol adapter for a CLI coding agent", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the agent binary name or path.
    #[arg(long)]
    agent_bin: Option<String>,

    /// Override the session history directory.
    #[arg(long)]
    history_dir: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("agent-conduit bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|err| AppError::Config(format!("cannot read config: {err}")))?;
            ConduitConfig::from_toml_str(&text)?
        }
        None => ConduitConfig::default(),
    };

    if let Some(agent_bin) = args.agent_bin {
        config.agent_bin = agent_bin;
    }
    if let Some(history_dir) = args.history_dir {
        config.history_dir = history_dir;
    }
    config.validate()?;

    info!(agent_bin = %config.agent_bin, "configuration loaded");
    server::run_stdio(Arc::new(config)).await
}

/// Install the tracing subscriber. Output goes to stderr so stdout stays
/// reserved for the client protocol.
fn init_tracing(format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let result = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    result.map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))
}
