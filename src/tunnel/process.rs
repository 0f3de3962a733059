// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! One privileged telepresence instance swapping one service's deployment.

use crate::config::{TunnelConfig, CREDENTIAL_VARS};
use crate::constants::tunnel::ELEVATION_STDIN_FLAG;
use crate::error::{DigoutError, Result};
use serde::Serialize;
use std::env;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TunnelState {
    Pending,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl TunnelState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TunnelState::Stopped | TunnelState::Failed)
    }
}

/// Stop-once bookkeeping shared by `start` and `stop`
#[derive(Debug, Default)]
struct Control {
    pid: Option<u32>,
    stop_requested: bool,
}

#[derive(Debug)]
pub struct TunnelProcess {
    service_name: String,
    local_port: u16,
    remote_port: u16,
    config: Arc<TunnelConfig>,
    state: watch::Sender<TunnelState>,
    control: Mutex<Control>,
}

impl TunnelProcess {
    pub fn new(
        service_name: impl Into<String>,
        local_port: u16,
        remote_port: u16,
        config: Arc<TunnelConfig>,
    ) -> Self {
        let (state, _) = watch::channel(TunnelState::Pending);
        Self {
            service_name: service_name.into(),
            local_port,
            remote_port,
            config,
            state,
            control: Mutex::new(Control::default()),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    pub fn remote_port(&self) -> u16 {
        self.remote_port
    }

    pub fn state(&self) -> TunnelState {
        *self.state.borrow()
    }

    /// OS pid of the elevation program, once spawned
    pub async fn pid(&self) -> Option<u32> {
        self.control.lock().await.pid
    }

    /// Wait until the process has exited
    pub async fn wait_for_exit(&self) -> TunnelState {
        let mut rx = self.state.subscribe();
        let state = match rx.wait_for(|s| s.is_terminal()).await {
            Ok(state) => *state,
            Err(_) => self.state(),
        };
        state
    }

    /// Spawn the tunnel and hand its lifetime to a supervising task.
    /// Returns once the process is spawned and has been given its credential.
    #[instrument(skip(self), fields(service = %self.service_name))]
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let Some(tool) = find_in_search_path(&self.config.tool, self.config.search_path.as_deref())
        else {
            self.fail();
            return Err(DigoutError::ToolNotFound(self.config.tool.clone()));
        };

        let mut args: Vec<OsString> = vec![tool.into_os_string()];
        args.extend(self.tunnel_args().into_iter().map(OsString::from));

        let (mut child, stdin) = match spawn_elevated(&self.config, &args, Stdio::piped()).await {
            Ok(spawned) => spawned,
            Err(e) => {
                self.fail();
                return Err(e);
            }
        };
        let pid = child.id();
        info!(
            "Tunnel spawned (pid {:?}) exposing {}:{}",
            pid, self.local_port, self.remote_port
        );

        self.state.send_if_modified(|s| {
            if *s == TunnelState::Pending {
                *s = TunnelState::Running;
                true
            } else {
                false
            }
        });

        if let Some(stderr) = child.stderr.take() {
            let service = self.service_name.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(service = %service, "tunnel: {}", line);
                }
            });
        }

        tokio::spawn(Arc::clone(self).supervise(child, stdin));
        self.record_pid(pid).await;

        Ok(())
    }

    /// Remember the spawned pid. A stop that arrived while spawning could not
    /// address the process yet and is delivered here.
    async fn record_pid(&self, pid: Option<u32>) {
        let stop_pending = {
            let mut control = self.control.lock().await;
            control.pid = pid;
            control.stop_requested
        };
        // The supervisor may already have reaped it, and the pid may be reused
        if stop_pending && !self.state().is_terminal() {
            if let Some(pid) = pid {
                info!("Delivering stop requested during spawn");
                let delivered = match self.signal(pid).await {
                    Ok(signal) => signal.finish().await,
                    Err(e) => Err(e),
                };
                if let Err(e) = delivered {
                    error!("Failed to signal tunnel pid {}: {}", pid, e);
                }
            }
        }
    }

    /// Signal the tunnel to terminate and wait for the kill to be delivered
    pub async fn stop(&self) -> Result<()> {
        match self.request_stop().await? {
            Some(signal) => signal.finish().await,
            None => Ok(()),
        }
    }

    /// Spawn the privileged kill without waiting for it to complete.
    ///
    /// Only the first call sends anything, and nothing is sent once the process
    /// has exited on its own. `None` means there was nothing to signal (yet).
    #[instrument(skip(self), fields(service = %self.service_name))]
    pub async fn request_stop(&self) -> Result<Option<PendingSignal>> {
        let pid = {
            let mut control = self.control.lock().await;
            if control.stop_requested {
                debug!("Stop already requested");
                return Ok(None);
            }
            control.stop_requested = true;
            control.pid
        };

        let stopping = self.state.send_if_modified(|s| {
            if s.is_terminal() {
                false
            } else {
                *s = TunnelState::Stopping;
                true
            }
        });
        if !stopping {
            debug!("Tunnel already exited ({:?})", self.state());
            return Ok(None);
        }

        match pid {
            Some(pid) => self.signal(pid).await.map(Some),
            None => {
                debug!("Tunnel not spawned yet, stop deferred to start");
                Ok(None)
            }
        }
    }

    fn tunnel_args(&self) -> Vec<String> {
        vec![
            "--swap-deployment".to_string(),
            self.service_name.clone(),
            "--expose".to_string(),
            format!("{}:{}", self.local_port, self.remote_port),
            "--run".to_string(),
            "bash".to_string(),
            "--login".to_string(),
        ]
    }

    fn fail(&self) {
        self.state.send_replace(TunnelState::Failed);
    }

    /// Spawn a privileged `kill <pid>`
    async fn signal(&self, pid: u32) -> Result<PendingSignal> {
        let args = [OsString::from("kill"), OsString::from(pid.to_string())];
        let (child, stdin) = spawn_elevated(&self.config, &args, Stdio::piped()).await?;
        drop(stdin);

        Ok(PendingSignal {
            pid,
            program: self.config.elevation_program.clone(),
            child,
        })
    }

    /// Owns the child until it exits, then records the outcome.
    /// The credential pipe stays open for the lifetime of the tunnel since the
    /// `--run bash --login` shell exits as soon as it reads EOF.
    async fn supervise(self: Arc<Self>, mut child: Child, stdin: Option<ChildStdin>) {
        let result = child.wait().await;
        drop(stdin);

        let stop_requested = self.control.lock().await.stop_requested;
        let next = match result {
            Ok(status) if status.success() || stop_requested => {
                info!(service = %self.service_name, "Tunnel exited with {}", status);
                TunnelState::Stopped
            }
            Ok(status) => {
                let err = DigoutError::ProcessExitedNonzero {
                    program: self.config.tool.clone(),
                    status,
                };
                error!(service = %self.service_name, "{}", err);
                TunnelState::Failed
            }
            Err(e) => {
                error!(service = %self.service_name, "Failed to wait for tunnel: {}", e);
                TunnelState::Failed
            }
        };
        self.state.send_replace(next);
    }
}

/// A privileged `kill` that has been spawned but not reaped yet
#[derive(Debug)]
pub struct PendingSignal {
    pid: u32,
    program: String,
    child: Child,
}

impl PendingSignal {
    /// Wait for the kill to complete. A target that is already gone only
    /// warrants a warning.
    pub async fn finish(self) -> Result<()> {
        let PendingSignal { pid, program, child } = self;
        let output = child
            .wait_with_output()
            .await
            .map_err(|source| DigoutError::ProcessSpawnFailed { program, source })?;

        if output.status.success() {
            info!("Sent termination signal to pid {}", pid);
        } else {
            warn!(
                "kill {} exited with {}: {}",
                pid,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

/// Spawn `<elevation program> -S <args>` and feed it the credential.
/// The write half of stdin is returned so the caller decides when to close it.
async fn spawn_elevated(
    config: &TunnelConfig,
    args: &[OsString],
    stderr: Stdio,
) -> Result<(Child, Option<ChildStdin>)> {
    let mut command = Command::new(&config.elevation_program);
    command
        .arg(ELEVATION_STDIN_FLAG)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(stderr);
    for var in CREDENTIAL_VARS {
        command.env_remove(var);
    }

    let mut child = command.spawn().map_err(|source| DigoutError::ProcessSpawnFailed {
        program: config.elevation_program.clone(),
        source,
    })?;

    let mut stdin = child.stdin.take();
    if let (Some(pipe), Some(credential)) = (stdin.as_mut(), config.credential.as_ref()) {
        let written = async {
            pipe.write_all(&credential.as_stdin_line()).await?;
            pipe.flush().await
        };
        if let Err(e) = written.await {
            warn!("Failed to write credential to {}: {}", config.elevation_program, e);
        }
    }

    Ok((child, stdin))
}

/// Resolve `program` like a shell would, against `search_path` or `PATH`
pub fn find_in_search_path(program: &str, search_path: Option<&OsStr>) -> Option<PathBuf> {
    if program.contains(std::path::MAIN_SEPARATOR) {
        let path = PathBuf::from(program);
        return is_executable(&path).then_some(path);
    }

    let search_path = match search_path {
        Some(p) => p.to_os_string(),
        None => env::var_os("PATH")?,
    };
    env::split_paths(&search_path)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
