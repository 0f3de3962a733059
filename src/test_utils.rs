// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Test utilities for mocking Kubernetes API responses and the external
//! tunnel tooling.

use http::{Request, Response};
use kube::client::Body;
use kube::Client;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tower::Service;

/// A mock HTTP service that returns predefined responses based on request paths
/// and records every request it receives.
#[derive(Clone)]
pub struct MockService {
    responses: Arc<Mutex<HashMap<(String, String), (u16, String)>>>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockService {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(HashMap::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Add a response for GET requests matching the exact path
    pub fn on_get(self, path: &str, status: u16, body: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(("GET".to_string(), path.to_string()), (status, body.to_string()));
        self
    }

    /// Path and query of every request seen so far, in arrival order
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    /// Build a kube Client from this mock service
    pub fn into_client(self) -> Client {
        Client::new(self, "default")
    }

    fn find_response(&self, method: &str, path: &str) -> Option<(u16, String)> {
        self.responses
            .lock()
            .unwrap()
            .get(&(method.to_string(), path.to_string()))
            .cloned()
    }
}

impl Default for MockService {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<Request<Body>> for MockService {
    type Response = Response<Body>;
    type Error = tower::BoxError;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let method = req.method().to_string();
        let path = req.uri().path().to_string();
        let path_and_query = req
            .uri()
            .path_and_query()
            .map(|pq| pq.to_string())
            .unwrap_or_else(|| path.clone());
        self.requests.lock().unwrap().push(path_and_query);

        let response = self.find_response(&method, &path);

        Box::pin(async move {
            let (status, body) = response
                .unwrap_or_else(|| (404, status_json(404, "NotFound", "not found")));
            Ok(Response::builder()
                .status(status)
                .header("content-type", "application/json")
                .body(Body::from(body.into_bytes()))
                .unwrap())
        })
    }
}

/// A `Status` failure body as returned by the API server
pub fn status_json(code: u16, reason: &str, message: &str) -> String {
    serde_json::json!({
        "kind": "Status",
        "apiVersion": "v1",
        "status": "Failure",
        "message": message,
        "reason": reason,
        "code": code
    })
    .to_string()
}

pub fn service_json(name: &str, uid: &str) -> serde_json::Value {
    serde_json::json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": {
            "name": name,
            "namespace": "default",
            "uid": uid
        }
    })
}

pub fn service_list_json(items: Vec<serde_json::Value>) -> String {
    serde_json::json!({
        "apiVersion": "v1",
        "kind": "ServiceList",
        "metadata": { "resourceVersion": "1" },
        "items": items
    })
    .to_string()
}

/// A pod with a single container named after `service`, running or waiting
pub fn pod_json(name: &str, service: &str, extra_labels: &[&str], running: bool) -> serde_json::Value {
    let mut labels = serde_json::Map::new();
    labels.insert(
        crate::constants::labels::SERVICE_NAME.to_string(),
        serde_json::Value::String(service.to_string()),
    );
    for label in extra_labels {
        labels.insert(label.to_string(), serde_json::Value::String("true".to_string()));
    }

    let state = if running {
        serde_json::json!({ "running": { "startedAt": "2026-01-01T00:00:00Z" } })
    } else {
        serde_json::json!({ "waiting": { "reason": "ContainerCreating" } })
    };

    serde_json::json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {
            "name": name,
            "namespace": "default",
            "labels": labels
        },
        "status": {
            "containerStatuses": [{
                "name": service,
                "image": format!("{}:latest", service),
                "imageID": "",
                "ready": running,
                "restartCount": 0,
                "state": state
            }]
        }
    })
}

pub fn pod_list_json(items: Vec<serde_json::Value>) -> String {
    serde_json::json!({
        "apiVersion": "v1",
        "kind": "PodList",
        "metadata": { "resourceVersion": "1" },
        "items": items
    })
    .to_string()
}

/// Stand-ins for `sudo` and `telepresence` living in a temporary directory.
///
/// The fake `sudo` insists on the expected credential as the first stdin
/// line, logs every `kill` it is asked to run, and otherwise execs its
/// arguments. The fake `telepresence` logs its arguments and runs `body`.
#[cfg(unix)]
pub struct FakeTools {
    dir: tempfile::TempDir,
}

#[cfg(unix)]
impl FakeTools {
    pub const CREDENTIAL: &'static str = "letmein";

    /// A tool that keeps running until killed
    pub fn new() -> Self {
        Self::with_tool_body("exec sleep 60")
    }

    pub fn with_tool_body(body: &str) -> Self {
        Self::build(body, 0, 0)
    }

    /// `sudo` logs each kill, then takes `secs` before running it
    pub fn with_slow_kill(secs: u32) -> Self {
        Self::build("exec sleep 60", 0, secs)
    }

    /// `sudo` waits `secs` before reading its credential
    pub fn with_slow_credential_read(secs: u32) -> Self {
        Self::build("exec sleep 60", secs, 0)
    }

    fn build(body: &str, read_delay: u32, kill_delay: u32) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().display().to_string();

        let sudo = format!(
            r#"#!/bin/sh
sleep {read_delay}
IFS= read -r credential || exit 1
[ "$credential" = '{credential}' ] || exit 1
shift
if [ "$1" = kill ]; then
    shift
    printf '%s\n' "$*" >> '{root}/kills.log'
    sleep {kill_delay}
    kill "$@"
    exit $?
fi
exec "$@"
"#,
            read_delay = read_delay,
            kill_delay = kill_delay,
            credential = Self::CREDENTIAL,
            root = root,
        );
        let tool = format!(
            r#"#!/bin/sh
printf '%s\n' "$*" >> '{root}/tool.log'
{body}
"#,
            root = root,
            body = body,
        );

        write_executable(&dir.path().join("sudo"), &sudo);
        write_executable(&dir.path().join("telepresence"), &tool);
        Self { dir }
    }

    pub fn dir(&self) -> &std::path::Path {
        self.dir.path()
    }

    /// Tunnel settings pointing at the fakes
    pub fn config(&self) -> crate::config::TunnelConfig {
        crate::config::TunnelConfig {
            tool: "telepresence".to_string(),
            elevation_program: self.dir().join("sudo").display().to_string(),
            credential: Some(crate::config::Credential::new(Self::CREDENTIAL)),
            search_path: Some(self.dir().as_os_str().to_os_string()),
            local_port: 8888,
            remote_port: 80,
        }
    }

    /// Pids passed to `kill`, one entry per invocation
    pub fn kills(&self) -> Vec<String> {
        self.read_lines("kills.log")
    }

    /// Arguments of the first tool invocation, if any
    pub fn tool_args(&self) -> Option<String> {
        self.read_lines("tool.log").into_iter().next()
    }

    /// Poll until the tool has started
    pub async fn wait_for_tool_args(&self) -> String {
        for _ in 0..200 {
            if let Some(args) = self.tool_args() {
                return args;
            }
            tokio::time::sleep(std::time::Duration::from_millis(25)).await;
        }
        panic!("telepresence fake was never invoked");
    }

    /// Poll until `sudo` has been asked for `count` kills
    pub async fn wait_for_kills(&self, count: usize) {
        for _ in 0..200 {
            if self.kills().len() >= count {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(25)).await;
        }
        panic!("sudo fake never received {} kill(s)", count);
    }

    fn read_lines(&self, file: &str) -> Vec<String> {
        std::fs::read_to_string(self.dir().join(file))
            .map(|content| content.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

#[cfg(unix)]
impl Default for FakeTools {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
fn write_executable(path: &std::path::Path, content: &str) {
    use std::os::unix::fs::PermissionsExt;
    std::fs::write(path, content).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}
