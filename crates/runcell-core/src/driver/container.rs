//! Containerized variant of the managed process
//!
//! Wires the session container, exec channel, and stream bridge together:
//! `start` acquires (or reuses) the labeled container, opens one exec shell
//! into it, and bridges the exec socket. Terminating tears down the bridge
//! and the exec attachment only; the container stays up so the session can
//! be re-entered, and is removed by an explicit session teardown.

use std::sync::Arc;

use async_trait::async_trait;

use super::ManagedProcess;
use crate::bridge::{OutputLines, StdinWriter, StreamBridge};
use crate::config::ContainerConfig;
use crate::engine::ContainerEngine;
use crate::errors::RuncellError;
use crate::exec::ExecChannel;
use crate::session::{Session, SessionContainer};

pub struct ContainerProcess {
    engine: Arc<dyn ContainerEngine>,
    session: Session,
    config: ContainerConfig,
    /// Interpreter start command written as the first line into the exec
    /// shell, so non-shell languages boot inside the container.
    command: String,
    bridge: Option<StreamBridge>,
    stdin: Option<StdinWriter>,
    container_id: Option<String>,
}

impl ContainerProcess {
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        session: Session,
        config: ContainerConfig,
        command: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            session,
            config,
            command: command.into(),
            bridge: None,
            stdin: None,
            container_id: None,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Id of the container backing this process, once started.
    pub fn container_id(&self) -> Option<&str> {
        self.container_id.as_deref()
    }
}

#[async_trait]
impl ManagedProcess for ContainerProcess {
    async fn start(&mut self) -> Result<(), RuncellError> {
        let sessions = SessionContainer::new(self.engine.clone(), self.config.clone());
        let container_id = sessions.acquire(&self.session).await?;
        let channel =
            ExecChannel::open(self.engine.as_ref(), &container_id, &self.config).await?;
        log::info!(
            "session {} attached to container {} via exec {}",
            self.session.id(),
            container_id,
            channel.id
        );
        let bridge = StreamBridge::new(channel.socket);
        let stdin = bridge.stdin();
        stdin.write(&format!("{}\n", self.command))?;
        self.stdin = Some(stdin);
        self.bridge = Some(bridge);
        self.container_id = Some(container_id);
        Ok(())
    }

    async fn write_input(&mut self, text: &str) -> Result<(), RuncellError> {
        self.stdin
            .as_ref()
            .ok_or(RuncellError::ProcessNotStarted)?
            .write(text)
    }

    fn take_stdout(&mut self) -> Option<OutputLines> {
        self.bridge.as_mut()?.take_stdout()
    }

    fn take_stderr(&mut self) -> Option<OutputLines> {
        self.bridge.as_mut()?.take_stderr()
    }

    async fn terminate(&mut self) {
        self.stdin = None;
        if let Some(bridge) = self.bridge.take() {
            bridge.shutdown().await;
        }
        // The container outlives the exec attachment so the session can be
        // re-entered; SessionContainer::teardown removes it.
    }
}
