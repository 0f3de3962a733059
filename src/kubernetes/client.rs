// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Control-plane client creation

use crate::config::Config;
use crate::error::{DigoutError, Result};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Client;
use std::path::Path;
use tracing::{info, instrument};

/// Create the Kubernetes client, from an explicit kubeconfig when one is configured
#[instrument(skip(config))]
pub async fn create_client(config: &Config) -> Result<Client> {
    match &config.kubeconfig {
        Some(path) => {
            info!("Loading kubeconfig from {}", path.display());
            create_client_from_path(path).await
        }
        None => Client::try_default()
            .await
            .map_err(|e| DigoutError::Kubeconfig(format!("Failed to infer config: {}", e))),
    }
}

async fn create_client_from_path(path: &Path) -> Result<Client> {
    let kubeconfig = tokio::fs::read_to_string(path).await.map_err(|e| {
        DigoutError::Kubeconfig(format!("Failed to read {}: {}", path.display(), e))
    })?;
    create_client_from_kubeconfig(&kubeconfig).await
}

/// Create a Kubernetes client from a kubeconfig string
async fn create_client_from_kubeconfig(kubeconfig: &str) -> Result<Client> {
    let kubeconfig_parsed: Kubeconfig = serde_yaml::from_str(kubeconfig)
        .map_err(|e| DigoutError::Kubeconfig(format!("Failed to parse kubeconfig: {}", e)))?;

    let client_config =
        kube::Config::from_custom_kubeconfig(kubeconfig_parsed, &KubeConfigOptions::default())
            .await
            .map_err(|e| DigoutError::Kubeconfig(format!("Failed to create config: {}", e)))?;

    Client::try_from(client_config)
        .map_err(|e| DigoutError::Kubeconfig(format!("Failed to create client: {}", e)))
}
