// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Derives a service's dig-out status from its pod topology.
//!
//! A swapped deployment shows up either as a single pod carrying the
//! telepresence label, or transiently as two pods (the original and the
//! proxy) while one of them is starting or terminating. Anything else is
//! not classifiable.

use crate::constants::labels;
use k8s_openapi::api::core::v1::{ContainerState, Pod};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DigOutStatus {
    Unknown,
    Open,
    Closed,
}

/// Classify `service_name` given its pods, in the order the cluster returned them.
///
/// With two pods the first one whose main container is running decides, so
/// the result depends on that order if both are running.
pub fn classify(service_name: &str, pods: &[Pod]) -> DigOutStatus {
    match pods {
        [pod] => status_of(pod),
        [_, _] => pods
            .iter()
            .find(|pod| is_main_container_running(service_name, pod))
            .map(status_of)
            .unwrap_or(DigOutStatus::Unknown),
        _ => DigOutStatus::Unknown,
    }
}

fn status_of(pod: &Pod) -> DigOutStatus {
    if has_tunnel_marker(pod) {
        DigOutStatus::Open
    } else {
        DigOutStatus::Closed
    }
}

/// Check if the pod carries the telepresence label, whatever its value
pub fn has_tunnel_marker(pod: &Pod) -> bool {
    pod.metadata
        .labels
        .as_ref()
        .is_some_and(|l| l.contains_key(labels::TUNNEL_MARKER))
}

/// State of the container named after the service
fn main_container_state<'a>(service_name: &str, pod: &'a Pod) -> Option<&'a ContainerState> {
    pod.status
        .as_ref()
        .and_then(|s| s.container_statuses.as_ref())
        .and_then(|statuses| statuses.iter().find(|cs| cs.name == service_name))
        .and_then(|cs| cs.state.as_ref())
}

fn is_main_container_running(service_name: &str, pod: &Pod) -> bool {
    main_container_state(service_name, pod).is_some_and(|state| state.running.is_some())
}
