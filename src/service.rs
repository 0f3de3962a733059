// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! The dig-out operations exposed to clients.

use crate::config::Config;
use crate::error::Result;
use crate::kubernetes::ClusterGateway;
use crate::status::{classify, DigOutStatus};
use crate::tunnel::{TunnelManager, TunnelState};
use kube::ResourceExt;
use serde::Serialize;
use tracing::{debug, info, instrument};

/// One row of the service listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceView {
    pub id: String,
    pub name: String,
    pub dig_out_status: DigOutStatus,
    /// State of the tunnel this server runs for the service, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tunnel: Option<TunnelState>,
}

/// Serving component: owns the cluster gateway and the tunnel registry
pub struct DigOutService {
    gateway: ClusterGateway,
    tunnels: TunnelManager,
    namespace: String,
    local_port: u16,
    remote_port: u16,
}

impl DigOutService {
    pub fn new(gateway: ClusterGateway, config: &Config) -> Self {
        Self {
            gateway,
            tunnels: TunnelManager::new(config.tunnel.clone()),
            namespace: config.namespace.clone(),
            local_port: config.tunnel.local_port,
            remote_port: config.tunnel.remote_port,
        }
    }

    pub fn tunnels(&self) -> &TunnelManager {
        &self.tunnels
    }

    /// Swap `service_name`'s deployment for a local process
    pub async fn dig_out(&self, service_name: &str) -> Result<()> {
        self.tunnels
            .add(service_name, self.local_port, self.remote_port)
            .await?;
        info!("Dug out service {}", service_name);
        Ok(())
    }

    /// Terminate the tunnel for `service_name`, restoring its deployment
    pub async fn de_dig_out(&self, service_name: &str) -> Result<()> {
        self.tunnels.remove(service_name).await?;
        info!("Restored service {}", service_name);
        Ok(())
    }

    /// List every service in the namespace with its dig-out status.
    /// Issues one pod query per service against live cluster state.
    #[instrument(skip(self), fields(namespace = %self.namespace))]
    pub async fn get_services(&self) -> Result<Vec<ServiceView>> {
        let services = self.gateway.list_services(&self.namespace).await?;
        let tunnel_states = self.tunnels.states().await;

        let mut views = Vec::with_capacity(services.len());
        for service in &services {
            let name = service.name_any();
            let pods = self.gateway.pods_of_service(&self.namespace, &name).await?;
            let dig_out_status = classify(&name, &pods);
            debug!("Service {} has {} pod(s): {:?}", name, pods.len(), dig_out_status);

            views.push(ServiceView {
                id: service.uid().unwrap_or_default(),
                tunnel: tunnel_states.get(&name).copied(),
                name,
                dig_out_status,
            });
        }

        Ok(views)
    }

    /// Stop every tunnel; called once when the server shuts down
    pub async fn shutdown(&self) {
        self.tunnels.shutdown().await;
    }
}
