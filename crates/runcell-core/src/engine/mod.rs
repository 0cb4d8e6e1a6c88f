//! Container engine abstraction
//!
//! The core needs exactly six lifecycle operations plus exec setup from the
//! engine; everything transport-specific lives behind this trait so the
//! session and driver layers can be exercised against a recording fake.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::errors::RuncellError;

pub(crate) mod attach;
pub mod docker;

#[cfg(test)]
pub(crate) mod fake;

/// Raw full-duplex byte stream of an attached exec instance. Inbound bytes
/// are multiplexed frames (see [`crate::frame`]); outbound bytes go to the
/// exec's stdin verbatim.
pub trait ExecSocket: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> ExecSocket for T {}

pub type BoxedExecSocket = Box<dyn ExecSocket>;

/// Engine-side view of a container found by label lookup.
#[derive(Debug, Clone)]
pub struct ContainerSummary {
    pub id: String,
    pub running: bool,
}

/// Everything needed to create a session container.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub image: String,
    /// Detached entry command keeping the container alive.
    pub command: Vec<String>,
    pub labels: HashMap<String, String>,
    /// Bind mounts in `host:container:mode` form.
    pub binds: Vec<String>,
    pub user: String,
    pub stdin_open: bool,
}

/// Parameters for one exec instance against a running container.
#[derive(Debug, Clone)]
pub struct ExecSpec {
    pub command: Vec<String>,
    pub working_dir: String,
    pub user: String,
}

#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// The container carrying `key=value`, if any. At most one exists per
    /// session label by construction.
    async fn find_by_label(
        &self,
        key: &str,
        value: &str,
    ) -> Result<Option<ContainerSummary>, RuncellError>;

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, RuncellError>;

    async fn start_container(&self, container_id: &str) -> Result<(), RuncellError>;

    async fn is_running(&self, container_id: &str) -> Result<bool, RuncellError>;

    async fn stop_container(&self, container_id: &str) -> Result<(), RuncellError>;

    async fn remove_container(&self, container_id: &str) -> Result<(), RuncellError>;

    async fn create_exec(
        &self,
        container_id: &str,
        spec: &ExecSpec,
    ) -> Result<String, RuncellError>;

    /// Attach to a created exec instance, returning the raw duplex socket.
    async fn start_exec(&self, exec_id: &str) -> Result<BoxedExecSocket, RuncellError>;
}
