// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Registry of active tunnels, at most one per service.

use crate::config::TunnelConfig;
use crate::error::{DigoutError, Result};
use crate::tunnel::process::{TunnelProcess, TunnelState};
use futures::future::join_all;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{error, info, instrument, warn};

/// How long shutdown waits for each tunnel to restore its deployment
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// How long `remove` waits for the privileged kill to complete
const SIGNAL_GRACE: Duration = Duration::from_secs(10);

/// Owns every tunnel this server spawned. Registry mutation and lookup are
/// serialized by a single lock; tunnel runtimes are not.
pub struct TunnelManager {
    config: Arc<TunnelConfig>,
    tunnels: Mutex<HashMap<String, Arc<TunnelProcess>>>,
}

impl TunnelManager {
    pub fn new(config: TunnelConfig) -> Self {
        Self {
            config: Arc::new(config),
            tunnels: Mutex::new(HashMap::new()),
        }
    }

    /// Register and start a tunnel for `service_name`.
    ///
    /// The tunnel is visible to lookups as `Pending` before it is spawned. If it
    /// cannot be spawned the registration is withdrawn and the error returned.
    #[instrument(skip(self))]
    pub async fn add(
        &self,
        service_name: &str,
        local_port: u16,
        remote_port: u16,
    ) -> Result<Arc<TunnelProcess>> {
        let tunnel = {
            let mut tunnels = self.tunnels.lock().await;
            match tunnels.entry(service_name.to_string()) {
                Entry::Occupied(_) => {
                    return Err(DigoutError::AlreadyExists(service_name.to_string()));
                }
                Entry::Vacant(slot) => {
                    let tunnel = Arc::new(TunnelProcess::new(
                        service_name,
                        local_port,
                        remote_port,
                        Arc::clone(&self.config),
                    ));
                    slot.insert(Arc::clone(&tunnel));
                    tunnel
                }
            }
        };
        info!("Registered tunnel for service {}", service_name);

        if let Err(e) = tunnel.start().await {
            error!("Failed to start tunnel for service {}: {}", service_name, e);
            let mut tunnels = self.tunnels.lock().await;
            if tunnels
                .get(service_name)
                .is_some_and(|t| Arc::ptr_eq(t, &tunnel))
            {
                tunnels.remove(service_name);
            }
            return Err(e);
        }

        Ok(tunnel)
    }

    /// Signal the service's tunnel to terminate and forget it.
    ///
    /// The kill is spawned before the entry is dropped. Its completion is
    /// awaited outside the registry lock, and the tunnel's own exit is not
    /// awaited at all.
    #[instrument(skip(self))]
    pub async fn remove(&self, service_name: &str) -> Result<()> {
        let pending = {
            let mut tunnels = self.tunnels.lock().await;
            let tunnel = tunnels
                .remove(service_name)
                .ok_or_else(|| DigoutError::NotFound(service_name.to_string()))?;

            match tunnel.request_stop().await {
                Ok(pending) => pending,
                Err(e) => {
                    error!("Failed to signal tunnel for service {}: {}", service_name, e);
                    None
                }
            }
        };
        info!("Removed tunnel for service {}", service_name);

        if let Some(signal) = pending {
            match timeout(SIGNAL_GRACE, signal.finish()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Failed to signal tunnel for service {}: {}", service_name, e),
                Err(_) => warn!(
                    "Kill for service {} still running after {:?}",
                    service_name, SIGNAL_GRACE
                ),
            }
        }

        Ok(())
    }

    pub async fn find_by_service_name(&self, service_name: &str) -> Result<Arc<TunnelProcess>> {
        self.tunnels
            .lock()
            .await
            .get(service_name)
            .cloned()
            .ok_or_else(|| DigoutError::NotFound(service_name.to_string()))
    }

    /// Lifecycle state of every registered tunnel
    pub async fn states(&self) -> HashMap<String, TunnelState> {
        self.tunnels
            .lock()
            .await
            .iter()
            .map(|(name, tunnel)| (name.clone(), tunnel.state()))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.tunnels.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tunnels.lock().await.is_empty()
    }

    /// Stop every tunnel and wait for them to exit so telepresence can
    /// restore the original deployments.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        let drained: Vec<Arc<TunnelProcess>> =
            self.tunnels.lock().await.drain().map(|(_, tunnel)| tunnel).collect();

        if drained.is_empty() {
            return;
        }
        info!("Stopping {} tunnel(s)", drained.len());

        join_all(drained.iter().map(|tunnel| async move {
            if let Err(e) = tunnel.stop().await {
                error!("Failed to signal tunnel for service {}: {}", tunnel.service_name(), e);
            }
            match timeout(SHUTDOWN_GRACE, tunnel.wait_for_exit()).await {
                Ok(state) => info!("Tunnel for service {} ended {:?}", tunnel.service_name(), state),
                Err(_) => warn!(
                    "Tunnel for service {} did not exit within {:?}",
                    tunnel.service_name(),
                    SHUTDOWN_GRACE
                ),
            }
        }))
        .await;
    }
}
