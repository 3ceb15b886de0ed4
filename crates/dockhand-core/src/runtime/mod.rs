//! Container runtime port.
//!
//! The sidecar consumes the container runtime as an abstract capability:
//! list containers by label, stop/start/restart with a timeout, and
//! subscribe to lifecycle events. [`docker`] provides the production
//! adapter (shelling out to the `docker` CLI); [`fake`] provides an
//! in-memory adapter for tests.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::labels::compose_metadata;

pub mod docker;
pub mod fake;

/// Mount kinds whose host-path resolution differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountKind {
    /// Direct host path mounted into the container
    Bind,
    /// Runtime-managed named volume
    Volume,
}

/// One entry of a container's mount table.
#[derive(Debug, Clone)]
pub struct Mount {
    pub kind: MountKind,
    /// Volume name; empty for bind mounts
    pub name: String,
    /// Host source path; empty when the runtime omits it for volumes
    pub source: String,
    /// Container-visible destination path
    pub destination: String,
}

impl Mount {
    pub fn bind(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            kind: MountKind::Bind,
            name: String::new(),
            source: source.into(),
            destination: destination.into(),
        }
    }

    pub fn volume(name: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            kind: MountKind::Volume,
            name: name.into(),
            source: String::new(),
            destination: destination.into(),
        }
    }
}

/// The subset of container metadata the sidecar consumes.
#[derive(Debug, Clone, Default)]
pub struct Container {
    pub id: String,
    pub name: String,
    pub labels: HashMap<String, String>,
    pub mounts: Vec<Mount>,
    pub project: String,
    pub service: String,
    pub state: String,
}

impl Container {
    /// Fills compose project/service identity from the label set.
    pub fn with_compose_metadata(mut self) -> Self {
        let (project, service) = compose_metadata(&self.labels);
        self.project = project;
        self.service = service;
        self
    }

    /// Display name for logs: container name, else a shortened id.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            short_id(&self.id)
        } else {
            &self.name
        }
    }

    /// Returns true if the container is currently running.
    pub fn is_running(&self) -> bool {
        self.state == "running"
    }
}

/// First 12 characters of a runtime identifier.
pub fn short_id(id: &str) -> &str {
    if id.len() > 12 {
        &id[..12]
    } else {
        id
    }
}

/// One container lifecycle event.
#[derive(Debug, Clone)]
pub struct RuntimeEvent {
    pub action: String,
    pub container_id: String,
}

/// Abstract container-runtime capability.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Lists containers (any state) matching a `key=value` label selector.
    async fn list_by_label(&self, selector: &str) -> Result<Vec<Container>>;

    /// Stops a container, giving it `timeout` to exit gracefully.
    async fn stop(&self, id: &str, timeout: Duration) -> Result<()>;

    /// Starts a stopped container.
    async fn start(&self, id: &str) -> Result<()>;

    /// Restarts a container by name or id with a bounded timeout.
    async fn restart(&self, name_or_id: &str, timeout: Duration) -> Result<()>;

    /// Subscribes to container lifecycle events.
    ///
    /// The returned channel closes when the stream terminates or the
    /// cancellation token fires; stream errors close it as well.
    async fn subscribe_events(
        &self,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<RuntimeEvent>>;
}
