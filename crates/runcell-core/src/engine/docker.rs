//! Docker implementation of the container engine surface
//!
//! Lifecycle calls go through bollard. The exec attach does not: bollard
//! demultiplexes exec output internally and never hands out the underlying
//! connection, so `start_exec` speaks the attach endpoint directly (see
//! [`attach`]) to obtain the raw multiplexed socket the frame decoder
//! consumes.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use bollard::exec::CreateExecOptions;
use bollard::models::{ContainerCreateBody, HostConfig};
use bollard::query_parameters::{
    CreateContainerOptions, InspectContainerOptions, ListContainersOptionsBuilder,
    RemoveContainerOptionsBuilder, StartContainerOptions, StopContainerOptionsBuilder,
};
use bollard::{Docker, API_DEFAULT_VERSION};

use super::{BoxedExecSocket, ContainerEngine, ContainerSpec, ContainerSummary, ExecSpec};
use crate::config::ContainerConfig;
use crate::engine::attach;
use crate::errors::RuncellError;

pub struct DockerEngine {
    docker: Docker,
    socket_path: PathBuf,
}

impl DockerEngine {
    /// Connect to the engine over its Unix socket.
    pub fn connect(config: &ContainerConfig) -> Result<Self, RuncellError> {
        let socket_path = config.engine_socket.clone();
        let docker = Docker::connect_with_unix(
            &socket_path.to_string_lossy(),
            120,
            API_DEFAULT_VERSION,
        )?;
        Ok(Self {
            docker,
            socket_path,
        })
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn find_by_label(
        &self,
        key: &str,
        value: &str,
    ) -> Result<Option<ContainerSummary>, RuncellError> {
        let mut filters = HashMap::new();
        filters.insert("label".to_string(), vec![format!("{}={}", key, value)]);
        let options = ListContainersOptionsBuilder::new()
            .all(true)
            .filters(&filters)
            .build();
        let containers = self.docker.list_containers(Some(options)).await?;
        let Some(id) = containers.into_iter().find_map(|c| c.id) else {
            return Ok(None);
        };
        let running = self.is_running(&id).await?;
        Ok(Some(ContainerSummary { id, running }))
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, RuncellError> {
        let body = ContainerCreateBody {
            image: Some(spec.image.clone()),
            cmd: Some(spec.command.clone()),
            labels: Some(spec.labels.clone()),
            user: Some(spec.user.clone()),
            open_stdin: Some(spec.stdin_open),
            tty: Some(false),
            host_config: Some(HostConfig {
                binds: Some(spec.binds.clone()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let created = self
            .docker
            .create_container(None::<CreateContainerOptions>, body)
            .await?;
        log::debug!("created container {} from image {}", created.id, spec.image);
        Ok(created.id)
    }

    async fn start_container(&self, container_id: &str) -> Result<(), RuncellError> {
        self.docker
            .start_container(container_id, None::<StartContainerOptions>)
            .await?;
        Ok(())
    }

    async fn is_running(&self, container_id: &str) -> Result<bool, RuncellError> {
        let info = self
            .docker
            .inspect_container(container_id, None::<InspectContainerOptions>)
            .await?;
        Ok(info
            .state
            .and_then(|state| state.running)
            .unwrap_or(false))
    }

    async fn stop_container(&self, container_id: &str) -> Result<(), RuncellError> {
        self.docker
            .stop_container(
                container_id,
                Some(StopContainerOptionsBuilder::new().t(5).build()),
            )
            .await?;
        Ok(())
    }

    async fn remove_container(&self, container_id: &str) -> Result<(), RuncellError> {
        self.docker
            .remove_container(
                container_id,
                Some(RemoveContainerOptionsBuilder::new().force(true).build()),
            )
            .await?;
        Ok(())
    }

    async fn create_exec(
        &self,
        container_id: &str,
        spec: &ExecSpec,
    ) -> Result<String, RuncellError> {
        let options = CreateExecOptions {
            cmd: Some(spec.command.clone()),
            attach_stdin: Some(true),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(false),
            working_dir: Some(spec.working_dir.clone()),
            user: Some(spec.user.clone()),
            ..Default::default()
        };
        let created = self.docker.create_exec(container_id, options).await?;
        Ok(created.id)
    }

    async fn start_exec(&self, exec_id: &str) -> Result<BoxedExecSocket, RuncellError> {
        let socket = attach::hijack_exec(&self.socket_path, exec_id).await?;
        Ok(Box::new(socket))
    }
}
