//! sluiced - the sluice storage gateway daemon
//!
//! Loads configuration, wires the provider registry, auth handler, rate
//! limiter and notification hook, then serves the v1 API until SIGINT or
//! SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sluice_core::config::Config;
use sluice_gateway::{Gateway, GatewayServer};

#[derive(Parser)]
#[command(name = "sluiced", about = "RESTful gateway for heterogeneous file storage")]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured listen address
    #[arg(short, long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Config::default(),
    };
    config.apply_env();
    if let Some(listen) = args.listen {
        config.server.listen = listen;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone())),
        )
        .init();

    let listen = config.server.listen.clone();
    let state = Arc::new(Gateway::from_config(config).await?);
    let server = GatewayServer::bind(Arc::clone(&state), &listen).await?;

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    server.run(shutdown).await?;
    info!("bye");
    Ok(())
}

/// Cancels the token on SIGINT or SIGTERM.
fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut terminate =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("installing SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => info!("received SIGINT"),
                _ = terminate.recv() => info!("received SIGTERM"),
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received ctrl-c");
        }
        shutdown.cancel();
    });
}
