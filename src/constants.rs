// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// Kubernetes label keys read by digout
pub mod labels {
    /// Label selecting the pods that belong to a service
    pub const SERVICE_NAME: &str = "app.kubernetes.io/name";
    /// Label carried by the pod telepresence swaps in for a deployment
    pub const TUNNEL_MARKER: &str = "telepresence";
}

/// Tunnel invocation defaults
pub mod tunnel {
    pub const TOOL: &str = "telepresence";
    pub const ELEVATION_PROGRAM: &str = "sudo";
    /// Makes the elevation program read its credential from stdin
    pub const ELEVATION_STDIN_FLAG: &str = "-S";
    pub const LOCAL_PORT: u16 = 8888;
    pub const REMOTE_PORT: u16 = 80;
}

pub const DEFAULT_NAMESPACE: &str = "default";
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8081";
