//! Recording fake of the engine surface
//!
//! Stands in for a real engine in tests: every call is appended to a log the
//! test can assert on, and `start_exec` hands out one side of an in-memory
//! duplex pipe so tests can script the remote shell.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::io::DuplexStream;

use super::{BoxedExecSocket, ContainerEngine, ContainerSpec, ContainerSummary, ExecSpec};
use crate::errors::RuncellError;

pub(crate) struct FakeEngine {
    pub calls: Mutex<Vec<String>>,
    containers: Mutex<HashMap<String, FakeContainer>>,
    next_id: AtomicUsize,
    /// When false, started containers never report running (timeout tests).
    start_brings_up: bool,
    /// Remote ends of the sockets handed out by `start_exec`.
    pub remotes: Mutex<Vec<DuplexStream>>,
}

struct FakeContainer {
    labels: HashMap<String, String>,
    running: bool,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            containers: Mutex::new(HashMap::new()),
            next_id: AtomicUsize::new(1),
            start_brings_up: true,
            remotes: Mutex::new(Vec::new()),
        }
    }

    /// An engine whose containers never come up.
    pub fn stuck() -> Self {
        Self {
            start_brings_up: false,
            ..Self::new()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn take_remote(&self) -> DuplexStream {
        self.remotes.lock().unwrap().remove(0)
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn find_by_label(
        &self,
        key: &str,
        value: &str,
    ) -> Result<Option<ContainerSummary>, RuncellError> {
        self.record(format!("find {}={}", key, value));
        let containers = self.containers.lock().unwrap();
        Ok(containers
            .iter()
            .find(|(_, c)| c.labels.get(key).map(String::as_str) == Some(value))
            .map(|(id, c)| ContainerSummary {
                id: id.clone(),
                running: c.running,
            }))
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, RuncellError> {
        let id = format!("ctr-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.record(format!("create {}", id));
        self.containers.lock().unwrap().insert(
            id.clone(),
            FakeContainer {
                labels: spec.labels.clone(),
                running: false,
            },
        );
        Ok(id)
    }

    async fn start_container(&self, container_id: &str) -> Result<(), RuncellError> {
        self.record(format!("start {}", container_id));
        let mut containers = self.containers.lock().unwrap();
        let container = containers
            .get_mut(container_id)
            .ok_or_else(|| RuncellError::EngineApi(format!("no such container {}", container_id)))?;
        container.running = self.start_brings_up;
        Ok(())
    }

    async fn is_running(&self, container_id: &str) -> Result<bool, RuncellError> {
        self.record(format!("inspect {}", container_id));
        let containers = self.containers.lock().unwrap();
        containers
            .get(container_id)
            .map(|c| c.running)
            .ok_or_else(|| RuncellError::EngineApi(format!("no such container {}", container_id)))
    }

    async fn stop_container(&self, container_id: &str) -> Result<(), RuncellError> {
        self.record(format!("stop {}", container_id));
        if let Some(container) = self.containers.lock().unwrap().get_mut(container_id) {
            container.running = false;
        }
        Ok(())
    }

    async fn remove_container(&self, container_id: &str) -> Result<(), RuncellError> {
        self.record(format!("remove {}", container_id));
        self.containers.lock().unwrap().remove(container_id);
        Ok(())
    }

    async fn create_exec(
        &self,
        container_id: &str,
        _spec: &ExecSpec,
    ) -> Result<String, RuncellError> {
        self.record(format!("create_exec {}", container_id));
        Ok(format!("exec-{}", container_id))
    }

    async fn start_exec(&self, exec_id: &str) -> Result<BoxedExecSocket, RuncellError> {
        self.record(format!("start_exec {}", exec_id));
        let (local, remote) = tokio::io::duplex(64 * 1024);
        self.remotes.lock().unwrap().push(remote);
        Ok(Box::new(local))
    }
}
