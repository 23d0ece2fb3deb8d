use std::path::PathBuf;

use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use floodgate::config::GatewayConfig;
use floodgate::proxy::GatewayServer;

/// Rate limiting reverse proxy gateway.
#[derive(Parser, Debug)]
#[command(name = "floodgate", version, about)]
struct Args {
    /// Path to the gateway configuration file
    #[arg(short, long, default_value = "floodgate.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let args = Args::parse();

    info!("Starting Floodgate gateway");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = GatewayConfig::from_file(&args.config)?;
    info!(
        routes = config.routes.len(),
        metrics = config.metrics,
        port = %config.port,
        "Configuration loaded"
    );

    let server = GatewayServer::from_config(&config)?;

    // Run the server with graceful shutdown on Ctrl+C or SIGTERM
    server.serve_with_shutdown(shutdown_signal()).await?;

    info!("Floodgate gateway stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
