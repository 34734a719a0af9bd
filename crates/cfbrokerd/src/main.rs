//! cfbrokerd — the cfbroker daemon.
//!
//! Loads the YAML configuration, connects the broker to the cluster
//! management API, and serves the broker protocol over HTTP.
//!
//! # Usage
//!
//! ```text
//! cfbrokerd --config /etc/cfbroker/config.yml
//! cfbrokerd check-config --config /etc/cfbroker/config.yml
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use cfbroker_core::BrokerConfig;
use cfbrokerd::{DEFAULT_LOG_FILTER, build_app};

#[derive(Parser)]
#[command(name = "cfbrokerd", about = "Service broker for Redis Enterprise clusters")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, global = true, default_value = "/etc/cfbroker/config.yml")]
    config: PathBuf,

    /// Port to listen on (overrides `broker.port`).
    #[arg(long)]
    port: Option<u16>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Validate the configuration file and exit.
    CheckConfig,
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: &Path) -> anyhow::Result<BrokerConfig> {
    let config = BrokerConfig::from_file(path)?;
    config
        .validate()
        .with_context(|| format!("invalid configuration in {}", path.display()))?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = load_config(&cli.config)?;

    match cli.command {
        Some(Command::CheckConfig) => {
            info!(
                path = %cli.config.display(),
                plans = config.broker.plans.len(),
                "configuration is valid"
            );
            Ok(())
        }
        None => serve(config, cli.port).await,
    }
}

async fn serve(config: BrokerConfig, port: Option<u16>) -> anyhow::Result<()> {
    info!(cluster = %config.cluster.address, "cfbroker daemon starting");

    let router = build_app(&config)?;
    let addr = SocketAddr::from(([0, 0, 0, 0], port.unwrap_or(config.broker.port)));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "broker API listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for shutdown signal");
                return;
            }
            info!("shutdown signal received");
        })
        .await?;

    info!("cfbroker daemon stopped");
    Ok(())
}
