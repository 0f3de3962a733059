// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Read-only queries against the cluster control plane

use crate::constants::labels;
use crate::error::Result;
use k8s_openapi::api::core::v1::{Pod, Service};
use k8s_openapi::NamespaceResourceScope;
use kube::{api::ListParams, Api, Client, Resource};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use tracing::{debug, instrument};

/// Lists live resources in a namespace. Every call hits the API server;
/// nothing is cached and failures are not retried.
#[derive(Clone)]
pub struct ClusterGateway {
    client: Client,
}

impl ClusterGateway {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// List resources of kind `K`, optionally filtered by a label selector
    pub async fn list<K>(&self, namespace: &str, selector: Option<&str>) -> Result<Vec<K>>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        K::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let mut lp = ListParams::default();
        if let Some(selector) = selector {
            lp = lp.labels(selector);
        }

        let list = api.list(&lp).await?;
        let kind = K::kind(&K::DynamicType::default()).to_string();
        debug!("Listed {} {} in namespace {}", list.items.len(), kind, namespace);
        Ok(list.items)
    }

    #[instrument(skip(self))]
    pub async fn list_services(&self, namespace: &str) -> Result<Vec<Service>> {
        self.list(namespace, None).await
    }

    #[instrument(skip(self))]
    pub async fn list_pods(&self, namespace: &str, selector: Option<&str>) -> Result<Vec<Pod>> {
        self.list(namespace, selector).await
    }

    /// Pods labelled as belonging to `service`
    pub async fn pods_of_service(&self, namespace: &str, service: &str) -> Result<Vec<Pod>> {
        let selector = service_selector(service);
        self.list_pods(namespace, Some(&selector)).await
    }
}

pub fn service_selector(service: &str) -> String {
    format!("{}={}", labels::SERVICE_NAME, service)
}
