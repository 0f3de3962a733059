// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::{Context, Result};
use std::env;
use std::ffi::OsString;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::constants::{tunnel, DEFAULT_LISTEN_ADDR, DEFAULT_NAMESPACE};

/// Environment variables that may hold the elevation credential. They are
/// stripped from every process digout spawns.
pub const CREDENTIAL_VARS: [&str; 2] = [
    "DIGOUT_ELEVATION_PASSWORD",
    "DIGOUT_ELEVATION_PASSWORD_FILE",
];

/// Secret handed to the elevation program over stdin
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// The line written to the elevation program's stdin
    pub fn as_stdin_line(&self) -> Vec<u8> {
        let mut line = self.0.trim_end_matches(['\r', '\n']).as_bytes().to_vec();
        line.push(b'\n');
        line
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// How tunnels are spawned and stopped
#[derive(Debug, Clone)]
pub struct TunnelConfig {
    /// Tunneling utility, resolved through the search path
    pub tool: String,
    /// Privilege elevation program wrapping both the tunnel and the kill
    pub elevation_program: String,
    pub credential: Option<Credential>,
    /// Overrides `PATH` when resolving the tool
    pub search_path: Option<OsString>,
    pub local_port: u16,
    pub remote_port: u16,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            tool: tunnel::TOOL.to_string(),
            elevation_program: tunnel::ELEVATION_PROGRAM.to_string(),
            credential: None,
            search_path: None,
            local_port: tunnel::LOCAL_PORT,
            remote_port: tunnel::REMOTE_PORT,
        }
    }
}

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Namespace whose services are listed and dug out
    pub namespace: String,
    pub listen_addr: SocketAddr,
    /// Explicit kubeconfig, otherwise the client is inferred
    pub kubeconfig: Option<PathBuf>,
    pub tunnel: TunnelConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let namespace = lookup("DIGOUT_NAMESPACE").unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());

        let listen_addr = lookup("DIGOUT_LISTEN_ADDR")
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string())
            .parse::<SocketAddr>()
            .context("DIGOUT_LISTEN_ADDR is not a valid socket address")?;

        let local_port = match lookup("DIGOUT_LOCAL_PORT") {
            Some(v) => v.parse::<u16>().context("DIGOUT_LOCAL_PORT is not a valid port")?,
            None => tunnel::LOCAL_PORT,
        };
        let remote_port = match lookup("DIGOUT_REMOTE_PORT") {
            Some(v) => v.parse::<u16>().context("DIGOUT_REMOTE_PORT is not a valid port")?,
            None => tunnel::REMOTE_PORT,
        };

        let credential = match lookup("DIGOUT_ELEVATION_PASSWORD_FILE") {
            Some(path) => {
                let secret = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read elevation password file {}", path))?;
                Some(Credential::new(secret))
            }
            None => lookup("DIGOUT_ELEVATION_PASSWORD").map(Credential::new),
        };

        Ok(Config {
            namespace,
            listen_addr,
            kubeconfig: lookup("DIGOUT_KUBECONFIG").map(PathBuf::from),
            tunnel: TunnelConfig {
                tool: lookup("DIGOUT_TUNNEL_TOOL").unwrap_or_else(|| tunnel::TOOL.to_string()),
                elevation_program: lookup("DIGOUT_ELEVATION_PROGRAM")
                    .unwrap_or_else(|| tunnel::ELEVATION_PROGRAM.to_string()),
                credential,
                search_path: None,
                local_port,
                remote_port,
            },
        })
    }
}
