//! Host Telemetry Endpoint - answers liveness checks and reports
//! point-in-time OS metrics (CPU, memory, load, network) as JSON.

use anyhow::{Context, Result};
use clap::Parser;
use hostmon::server;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Minimal host-telemetry HTTP endpoint
#[derive(Parser, Debug)]
#[command(name = "hostmon")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TCP port to bind (also read from the PORT environment variable)
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    tracing::info!("hostmon listening on {addr}");

    axum::serve(listener, server::router())
        .await
        .context("Server error")?;

    Ok(())
}
