//! Production runtime adapter backed by the `docker` CLI.
//!
//! Containers are listed with `docker ps` + `docker container inspect`
//! and events are streamed from `docker events`; all invocations go
//! through the process-exec wrapper and observe the shared cancellation
//! token. A non-default socket reaches the CLI via `DOCKER_HOST`.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{Container, ContainerRuntime, Mount, MountKind, RuntimeEvent};
use crate::error::{Result, SidecarError};
use crate::exec::{self, RunOptions};

/// Runtime adapter shelling out to the local `docker` binary.
pub struct DockerCli {
    socket: String,
    cancel: CancellationToken,
}

impl DockerCli {
    /// Creates an adapter for the given socket/host setting.
    ///
    /// `socket` accepts a bare socket path, a `unix://` address, or a
    /// `tcp://` host; empty means the CLI default.
    pub fn new(socket: impl Into<String>, cancel: CancellationToken) -> Self {
        Self {
            socket: socket.into(),
            cancel,
        }
    }

    /// Normalized `DOCKER_HOST` value, when one must be exported.
    pub fn host(&self) -> Option<String> {
        normalize_host(&self.socket)
    }

    fn run_options(&self) -> RunOptions {
        let mut opts = RunOptions::default();
        if let Some(host) = self.host() {
            opts.envs.push(("DOCKER_HOST".to_string(), host));
        }
        opts
    }

    async fn docker_capture(&self, args: &[&str]) -> Result<String> {
        exec::run_capture(&self.cancel, "docker", args, &self.run_options()).await
    }
}

/// Normalizes a socket flag into a `DOCKER_HOST` address.
pub fn normalize_host(socket: &str) -> Option<String> {
    if socket.is_empty() {
        return None;
    }
    if socket.starts_with("unix://") || socket.starts_with("tcp://") {
        return Some(socket.to_string());
    }
    Some(format!("unix://{}", socket.trim_end_matches('/')))
}

/// Resolves the socket flag to a local filesystem path for bind mounts.
///
/// The backup pipeline mounts the socket into the tool container, so a
/// `tcp://` host is a configuration error here.
pub fn socket_path(socket: &str) -> Result<String> {
    if socket.is_empty() {
        return Ok("/var/run/docker.sock".to_string());
    }
    if let Some(path) = socket.strip_prefix("unix://") {
        return Ok(path.to_string());
    }
    if socket.starts_with("tcp://") {
        return Err(SidecarError::configuration(format!(
            "docker run requires a local socket, got tcp host {socket}"
        )));
    }
    Ok(socket.trim_end_matches('/').to_string())
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn list_by_label(&self, selector: &str) -> Result<Vec<Container>> {
        let filter = format!("label={selector}");
        let listed = self
            .docker_capture(&["ps", "-aq", "--no-trunc", "--filter", &filter])
            .await
            .map_err(|e| SidecarError::runtime("list containers", e.to_string()))?;

        let ids: Vec<&str> = listed.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut args = vec!["container", "inspect"];
        args.extend(ids);
        let inspected = self
            .docker_capture(&args)
            .await
            .map_err(|e| SidecarError::runtime("inspect containers", e.to_string()))?;

        let entries: Vec<InspectEntry> = serde_json::from_str(&inspected)
            .map_err(|e| SidecarError::runtime("inspect containers", format!("parse output: {e}")))?;
        Ok(entries.into_iter().map(InspectEntry::into_container).collect())
    }

    async fn stop(&self, id: &str, timeout: Duration) -> Result<()> {
        let secs = timeout.as_secs().to_string();
        self.docker_capture(&["stop", "-t", &secs, id])
            .await
            .map_err(|e| SidecarError::runtime("stop container", e.to_string()))?;
        Ok(())
    }

    async fn start(&self, id: &str) -> Result<()> {
        self.docker_capture(&["start", id])
            .await
            .map_err(|e| SidecarError::runtime("start container", e.to_string()))?;
        Ok(())
    }

    async fn restart(&self, name_or_id: &str, timeout: Duration) -> Result<()> {
        if name_or_id.is_empty() {
            return Err(SidecarError::configuration("container name required for restart"));
        }
        let secs = timeout.as_secs().to_string();
        self.docker_capture(&["restart", "-t", &secs, name_or_id])
            .await
            .map_err(|e| SidecarError::runtime("restart container", e.to_string()))?;
        Ok(())
    }

    async fn subscribe_events(
        &self,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<RuntimeEvent>> {
        let mut command = Command::new("docker");
        command
            .args(["events", "--filter", "type=container", "--format", "{{json .}}"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(host) = self.host() {
            command.env("DOCKER_HOST", host);
        }

        let mut child = command.spawn().map_err(|e| {
            SidecarError::runtime("subscribe events", format!("spawn docker events: {e}"))
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            SidecarError::runtime("subscribe events", "docker events stdout unavailable")
        })?;

        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            // child is moved in so kill_on_drop reaps it when we return
            let _child = child;
            let mut lines = BufReader::new(stdout).lines();
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    line = lines.next_line() => match line {
                        Ok(Some(line)) => {
                            let Ok(event) = serde_json::from_str::<EventLine>(&line) else {
                                debug!("unparseable docker event line: {line}");
                                continue;
                            };
                            if tx
                                .send(RuntimeEvent {
                                    action: event.action,
                                    container_id: event.id,
                                })
                                .await
                                .is_err()
                            {
                                break;
                            }
                        }
                        Ok(None) => {
                            debug!("docker events stream ended");
                            break;
                        }
                        Err(e) => {
                            warn!("docker events read failed: {e}");
                            break;
                        }
                    },
                }
            }
        });
        Ok(rx)
    }
}

#[derive(Debug, Deserialize)]
struct InspectEntry {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Name", default)]
    name: String,
    #[serde(rename = "Config", default)]
    config: InspectConfig,
    #[serde(rename = "Mounts", default)]
    mounts: Vec<InspectMount>,
    #[serde(rename = "State", default)]
    state: InspectState,
}

#[derive(Debug, Deserialize, Default)]
struct InspectConfig {
    #[serde(rename = "Labels", default)]
    labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct InspectMount {
    #[serde(rename = "Type")]
    kind: String,
    #[serde(rename = "Name", default)]
    name: String,
    #[serde(rename = "Source", default)]
    source: String,
    #[serde(rename = "Destination", default)]
    destination: String,
}

#[derive(Debug, Deserialize, Default)]
struct InspectState {
    #[serde(rename = "Status", default)]
    status: String,
}

#[derive(Debug, Deserialize)]
struct EventLine {
    #[serde(rename = "Action", default)]
    action: String,
    #[serde(default)]
    id: String,
}

impl InspectEntry {
    fn into_container(self) -> Container {
        let mounts = self
            .mounts
            .into_iter()
            .filter_map(|m| {
                let kind = match m.kind.as_str() {
                    "bind" => MountKind::Bind,
                    "volume" => MountKind::Volume,
                    _ => return None,
                };
                Some(Mount {
                    kind,
                    name: m.name,
                    source: m.source,
                    destination: m.destination,
                })
            })
            .collect();
        Container {
            id: self.id,
            name: self.name.trim_start_matches('/').to_string(),
            labels: self.config.labels.unwrap_or_default(),
            mounts,
            project: String::new(),
            service: String::new(),
            state: self.state.status,
        }
        .with_compose_metadata()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_normalization() {
        assert_eq!(normalize_host(""), None);
        assert_eq!(
            normalize_host("/var/run/docker.sock").as_deref(),
            Some("unix:///var/run/docker.sock")
        );
        assert_eq!(
            normalize_host("unix:///run/docker.sock").as_deref(),
            Some("unix:///run/docker.sock")
        );
        assert_eq!(
            normalize_host("tcp://10.0.0.2:2375").as_deref(),
            Some("tcp://10.0.0.2:2375")
        );
    }

    #[test]
    fn socket_path_rejects_tcp_hosts() {
        assert_eq!(socket_path("").expect("default"), "/var/run/docker.sock");
        assert_eq!(
            socket_path("unix:///run/docker.sock").expect("unix"),
            "/run/docker.sock"
        );
        assert!(matches!(
            socket_path("tcp://10.0.0.2:2375"),
            Err(SidecarError::Configuration { .. })
        ));
    }

    #[test]
    fn inspect_entry_maps_to_container() {
        let raw = r#"{
            "Id": "0123456789abcdef",
            "Name": "/demo-1",
            "State": { "Status": "running" },
            "Config": { "Labels": {
                "backrest.enable": "true",
                "com.docker.compose.project": "demo",
                "com.docker.compose.service": "api"
            } },
            "Mounts": [
                { "Type": "bind", "Source": "/host/data", "Destination": "/srv/data" },
                { "Type": "volume", "Name": "pgdata", "Source": "/var/lib/docker/volumes/pgdata/_data", "Destination": "/var/lib/postgresql/data" },
                { "Type": "tmpfs", "Destination": "/tmp" }
            ]
        }"#;
        let entry: InspectEntry = serde_json::from_str(raw).expect("parse inspect entry");
        let container = entry.into_container();
        assert_eq!(container.name, "demo-1");
        assert_eq!(container.project, "demo");
        assert_eq!(container.service, "api");
        assert!(container.is_running());
        assert_eq!(container.mounts.len(), 2);
        assert_eq!(container.mounts[0].kind, MountKind::Bind);
        assert_eq!(container.mounts[1].name, "pgdata");
    }
}
