// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::Result;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use digout::api;
use digout::config::Config;
use digout::kubernetes::{create_client, ClusterGateway};
use digout::service::DigOutService;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting digout");

    // Load configuration
    let config = Config::from_env()?;
    info!(
        "Configuration loaded: namespace={}, tool={}, ports={}:{}",
        config.namespace, config.tunnel.tool, config.tunnel.local_port, config.tunnel.remote_port
    );
    if config.tunnel.credential.is_none() {
        warn!("No elevation credential configured, {} must not prompt", config.tunnel.elevation_program);
    }

    // Create Kubernetes client
    let client = create_client(&config).await?;
    info!("Connected to Kubernetes cluster");

    let service = Arc::new(DigOutService::new(ClusterGateway::new(client), &config));
    let listener = TcpListener::bind(config.listen_addr).await?;

    let served = api::serve(listener, Arc::clone(&service), shutdown_signal()).await;

    info!("Shutting down, stopping active tunnels");
    service.shutdown().await;
    served
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
