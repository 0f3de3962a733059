// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DigoutError {
    #[error("No tunnel registered for service '{0}'")]
    NotFound(String),

    #[error("A tunnel is already registered for service '{0}'")]
    AlreadyExists(String),

    #[error("Cluster unavailable: {0}")]
    ClusterUnavailable(#[from] kube::Error),

    #[error("Failed to load kubeconfig: {0}")]
    Kubeconfig(String),

    #[error("Tunnel tool '{0}' not found in search path")]
    ToolNotFound(String),

    #[error("Failed to spawn '{program}': {source}")]
    ProcessSpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Process '{program}' exited with {status}")]
    ProcessExitedNonzero {
        program: String,
        status: std::process::ExitStatus,
    },
}

pub type Result<T> = std::result::Result<T, DigoutError>;
