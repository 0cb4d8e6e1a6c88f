//! Interactive exec channel into a session container
//!
//! One exec instance per driver lifetime: the attached shell keeps working
//! directory and interpreter state alive across submissions, which arrive as
//! newline-terminated lines on the same socket rather than as new execs.

use crate::config::ContainerConfig;
use crate::engine::{BoxedExecSocket, ContainerEngine, ExecSpec};
use crate::errors::RuncellError;

pub struct ExecChannel {
    pub id: String,
    pub socket: BoxedExecSocket,
}

impl ExecChannel {
    /// Create and attach an exec instance running an interactive shell in
    /// the workspace mount, stdin/stdout/stderr all enabled, no tty.
    pub async fn open(
        engine: &dyn ContainerEngine,
        container_id: &str,
        config: &ContainerConfig,
    ) -> Result<Self, RuncellError> {
        let spec = ExecSpec {
            command: vec!["/bin/bash".to_string()],
            working_dir: config.mount_path.clone(),
            user: config.user.clone(),
        };
        let id = engine.create_exec(container_id, &spec).await?;
        let socket = engine.start_exec(&id).await?;
        log::debug!("opened exec channel {} into container {}", id, container_id);
        Ok(Self { id, socket })
    }
}
