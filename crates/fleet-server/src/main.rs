//! Fleet server binary

use anyhow::Context;
use clap::Parser;
use fleet_server::{Config, FleetServer, setup_tracing};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// Machine registry with periodic liveness checks
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to configuration file
    #[arg(long, env = "FLEET_CONFIG", default_value = "config.yaml")]
    config: PathBuf,

    /// Toggle to enable debug mode
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Tracing is not initialized yet, errors go straight to stderr
    let config = Config::load_from_file(&args.config)
        .with_context(|| format!("failed to load configuration {}", args.config.display()))?;

    let _telemetry_guard = setup_tracing(&config.logging, &config.telemetry, args.debug)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;
    config.warn_readonly();

    let server = FleetServer::load(config)
        .await
        .context("failed to load machines")?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            return;
        }
        tracing::info!("Shutdown signal received");
        signal.cancel();
    });

    server
        .run(shutdown)
        .await
        .map_err(|e| anyhow::anyhow!("server error: {e}"))?;

    // Telemetry guard will flush spans on drop
    Ok(())
}
