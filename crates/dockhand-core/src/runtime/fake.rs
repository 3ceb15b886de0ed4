//! In-memory runtime adapter for tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{Container, ContainerRuntime, RuntimeEvent};
use crate::error::{Result, SidecarError};

#[derive(Default)]
struct Inner {
    containers: Vec<Container>,
    stopped: Vec<String>,
    started: Vec<String>,
    restarted: Vec<String>,
    list_calls: usize,
    fail_stop_for: Option<String>,
    events_tx: Option<mpsc::Sender<RuntimeEvent>>,
}

/// Scriptable in-memory [`ContainerRuntime`].
///
/// Serves a canned container set, records every stop/start/restart call,
/// and lets tests push lifecycle events into an open subscription.
#[derive(Clone, Default)]
pub struct FakeRuntime {
    inner: Arc<Mutex<Inner>>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_containers(containers: Vec<Container>) -> Self {
        let fake = Self::new();
        fake.set_containers(containers);
        fake
    }

    pub fn set_containers(&self, containers: Vec<Container>) {
        self.lock().containers = containers;
    }

    /// Makes `stop` fail for the given container id.
    pub fn fail_stop_on(&self, id: impl Into<String>) {
        self.lock().fail_stop_for = Some(id.into());
    }

    pub fn stopped(&self) -> Vec<String> {
        self.lock().stopped.clone()
    }

    pub fn started(&self) -> Vec<String> {
        self.lock().started.clone()
    }

    pub fn restarted(&self) -> Vec<String> {
        self.lock().restarted.clone()
    }

    pub fn list_calls(&self) -> usize {
        self.lock().list_calls
    }

    /// Pushes an event into the open subscription; returns false when no
    /// subscriber is listening.
    pub async fn emit_event(&self, action: &str, container_id: &str) -> bool {
        let tx = self.lock().events_tx.clone();
        match tx {
            Some(tx) => tx
                .send(RuntimeEvent {
                    action: action.to_string(),
                    container_id: container_id.to_string(),
                })
                .await
                .is_ok(),
            None => false,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn matches_selector(container: &Container, selector: &str) -> bool {
    match selector.split_once('=') {
        Some((key, value)) => container.labels.get(key).map(String::as_str) == Some(value),
        None => container.labels.contains_key(selector),
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn list_by_label(&self, selector: &str) -> Result<Vec<Container>> {
        let mut inner = self.lock();
        inner.list_calls += 1;
        Ok(inner
            .containers
            .iter()
            .filter(|c| matches_selector(c, selector))
            .cloned()
            .collect())
    }

    async fn stop(&self, id: &str, _timeout: Duration) -> Result<()> {
        let mut inner = self.lock();
        if inner.fail_stop_for.as_deref() == Some(id) {
            return Err(SidecarError::runtime("stop container", format!("injected failure for {id}")));
        }
        inner.stopped.push(id.to_string());
        if let Some(container) = inner.containers.iter_mut().find(|c| c.id == id) {
            container.state = "exited".to_string();
        }
        Ok(())
    }

    async fn start(&self, id: &str) -> Result<()> {
        let mut inner = self.lock();
        inner.started.push(id.to_string());
        if let Some(container) = inner.containers.iter_mut().find(|c| c.id == id) {
            container.state = "running".to_string();
        }
        Ok(())
    }

    async fn restart(&self, name_or_id: &str, _timeout: Duration) -> Result<()> {
        self.lock().restarted.push(name_or_id.to_string());
        Ok(())
    }

    async fn subscribe_events(
        &self,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<RuntimeEvent>> {
        let (tx, rx) = mpsc::channel(16);
        self.lock().events_tx = Some(tx);
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            cancel.cancelled().await;
            if let Ok(mut inner) = inner.lock() {
                inner.events_tx = None;
            }
        });
        Ok(rx)
    }
}
