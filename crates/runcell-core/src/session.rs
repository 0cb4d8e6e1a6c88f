//! Session identity and container lifetime management
//!
//! A session binds one workspace directory to at most one container, keyed
//! by a `session_id` label on the engine side. Lookup-before-create makes
//! acquisition idempotent: repeated acquires for the same session return the
//! same container instead of spawning duplicates. Teardown is an explicit
//! call, never an exit hook.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use uuid::Uuid;

use crate::config::ContainerConfig;
use crate::engine::{ContainerEngine, ContainerSpec};
use crate::errors::RuncellError;

/// Label key identifying a session's container on the engine.
pub const SESSION_LABEL: &str = "session_id";

/// A persistent unit of execution identity: one id, one workspace directory,
/// at most one container.
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    workspace: PathBuf,
}

impl Session {
    /// Session whose id is the workspace path's basename.
    pub fn from_workspace(workspace: PathBuf) -> Result<Self, RuncellError> {
        let id = workspace
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string)
            .ok_or_else(|| {
                RuncellError::Config(format!(
                    "workspace path {} has no usable basename",
                    workspace.display()
                ))
            })?;
        Ok(Self { id, workspace })
    }

    /// Session with a caller-chosen id, housed under `sessions_root`.
    pub fn named(id: impl Into<String>, sessions_root: &Path) -> Self {
        let id = id.into();
        let workspace = sessions_root.join(&id);
        Self { id, workspace }
    }

    /// Fresh session with a generated `ses-<uuid>` id.
    pub fn generate(sessions_root: &Path) -> Self {
        Self::named(format!("ses-{}", Uuid::new_v4()), sessions_root)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }
}

/// Acquires and tears down the container backing a session.
pub struct SessionContainer {
    engine: Arc<dyn ContainerEngine>,
    config: ContainerConfig,
}

impl SessionContainer {
    pub fn new(engine: Arc<dyn ContainerEngine>, config: ContainerConfig) -> Self {
        Self { engine, config }
    }

    /// Return the id of a running container for this session, reusing an
    /// existing one when the label lookup finds it and creating one
    /// otherwise. Engine API errors surface to the caller; retry decisions
    /// belong to a higher layer.
    pub async fn acquire(&self, session: &Session) -> Result<String, RuncellError> {
        tokio::fs::create_dir_all(session.workspace()).await?;

        if let Some(existing) = self
            .engine
            .find_by_label(SESSION_LABEL, session.id())
            .await?
        {
            if !existing.running {
                log::info!(
                    "restarting stopped container {} for session {}",
                    existing.id,
                    session.id()
                );
                self.engine.start_container(&existing.id).await?;
                self.wait_for_running(&existing.id).await?;
            }
            return Ok(existing.id);
        }

        let spec = ContainerSpec {
            image: self.config.image.clone(),
            command: vec!["/bin/bash".to_string(), "-i".to_string()],
            labels: HashMap::from([(SESSION_LABEL.to_string(), session.id().to_string())]),
            binds: vec![format!(
                "{}:{}:rw",
                session.workspace().display(),
                self.config.mount_path
            )],
            user: self.config.user.clone(),
            stdin_open: true,
        };
        let container_id = self.engine.create_container(&spec).await?;
        log::info!(
            "created container {} for session {}",
            container_id,
            session.id()
        );
        self.engine.start_container(&container_id).await?;
        self.wait_for_running(&container_id).await?;
        Ok(container_id)
    }

    /// Poll the running state until it flips or the start timeout elapses.
    async fn wait_for_running(&self, container_id: &str) -> Result<(), RuncellError> {
        let timeout = self.config.start_timeout();
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.engine.is_running(container_id).await? {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(RuncellError::ContainerStartTimeout {
                    container_id: container_id.to_string(),
                    timeout,
                });
            }
            tokio::time::sleep(self.config.start_poll_interval()).await;
        }
    }

    /// Stop and remove the session's container and delete its workspace
    /// directory. Safe to call when no container exists.
    pub async fn teardown(&self, session: &Session) -> Result<(), RuncellError> {
        if let Some(existing) = self
            .engine
            .find_by_label(SESSION_LABEL, session.id())
            .await?
        {
            if existing.running {
                self.engine.stop_container(&existing.id).await?;
            }
            self.engine.remove_container(&existing.id).await?;
            log::info!(
                "removed container {} for session {}",
                existing.id,
                session.id()
            );
        }
        if session.workspace().exists() {
            tokio::fs::remove_dir_all(session.workspace()).await?;
        }
        Ok(())
    }
}
