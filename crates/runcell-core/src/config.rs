//! Configuration for the execution engine
//!
//! Serde-derived structs with per-field defaults, so a minimal YAML file (or
//! none at all) yields a working setup and individual knobs can be overridden
//! progressively.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::RuncellError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuncellConfig {
    #[serde(default)]
    pub container: ContainerConfig,
    #[serde(default)]
    pub driver: DriverConfig,
}

impl RuncellConfig {
    pub fn from_yaml_file(path: &Path) -> Result<Self, RuncellError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            RuncellError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: RuncellConfig = serde_yaml::from_str(&raw)?;
        Ok(config)
    }
}

/// Settings for session containers and the engine they run on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Image used for session containers.
    #[serde(default = "default_image")]
    pub image: String,
    /// In-container path the session workspace is bind-mounted at.
    #[serde(default = "default_mount_path")]
    pub mount_path: String,
    /// Unprivileged user the container and its exec shells run as.
    #[serde(default = "default_user")]
    pub user: String,
    /// Upper bound on waiting for a container to reach the running state.
    #[serde(default = "default_start_timeout_secs")]
    pub start_timeout_secs: u64,
    /// Interval between running-state polls while waiting.
    #[serde(default = "default_start_poll_secs")]
    pub start_poll_secs: u64,
    /// Path of the container engine's Unix socket.
    #[serde(default = "default_engine_socket")]
    pub engine_socket: PathBuf,
    /// Root directory for session workspaces; defaults to the user data dir.
    #[serde(default)]
    pub sessions_dir: Option<PathBuf>,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            image: default_image(),
            mount_path: default_mount_path(),
            user: default_user(),
            start_timeout_secs: default_start_timeout_secs(),
            start_poll_secs: default_start_poll_secs(),
            engine_socket: default_engine_socket(),
            sessions_dir: None,
        }
    }
}

impl ContainerConfig {
    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_secs)
    }

    pub fn start_poll_interval(&self) -> Duration {
        Duration::from_secs(self.start_poll_secs)
    }

    /// Directory session workspaces live under.
    pub fn sessions_root(&self) -> PathBuf {
        match &self.sessions_dir {
            Some(dir) => dir.clone(),
            None => dirs::data_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("runcell")
                .join("sessions"),
        }
    }
}

/// Settings for the process driver's retry and drain behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Submission-write retries before giving up (restart between attempts).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// How long the caller-facing stream waits for the next queued event.
    #[serde(default = "default_drain_wait_ms")]
    pub drain_wait_ms: u64,
    /// Extra queue drains after completion is marked. Heuristic tail flush;
    /// tunable, not a guarantee against late-arriving lines.
    #[serde(default = "default_drain_extra_rounds")]
    pub drain_extra_rounds: u32,
    /// Pause between those extra drains.
    #[serde(default = "default_drain_extra_pause_ms")]
    pub drain_extra_pause_ms: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            drain_wait_ms: default_drain_wait_ms(),
            drain_extra_rounds: default_drain_extra_rounds(),
            drain_extra_pause_ms: default_drain_extra_pause_ms(),
        }
    }
}

impl DriverConfig {
    pub fn drain_wait(&self) -> Duration {
        Duration::from_millis(self.drain_wait_ms)
    }

    pub fn drain_extra_pause(&self) -> Duration {
        Duration::from_millis(self.drain_extra_pause_ms)
    }
}

fn default_image() -> String {
    "runcell-runtime:latest".to_string()
}

fn default_mount_path() -> String {
    "/mnt/data".to_string()
}

fn default_user() -> String {
    "nobody".to_string()
}

fn default_start_timeout_secs() -> u64 {
    30
}

fn default_start_poll_secs() -> u64 {
    1
}

fn default_engine_socket() -> PathBuf {
    PathBuf::from("/var/run/docker.sock")
}

fn default_max_retries() -> u32 {
    3
}

fn default_drain_wait_ms() -> u64 {
    300
}

fn default_drain_extra_rounds() -> u32 {
    3
}

fn default_drain_extra_pause_ms() -> u64 {
    200
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config: RuncellConfig = serde_yaml::from_str("container:\n  image: custom:1\n").unwrap();
        assert_eq!(config.container.image, "custom:1");
        assert_eq!(config.container.mount_path, "/mnt/data");
        assert_eq!(config.container.start_timeout_secs, 30);
        assert_eq!(config.driver.max_retries, 3);
    }

    #[test]
    fn empty_document_is_a_full_default_config() {
        let config: RuncellConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.container.user, "nobody");
        assert_eq!(config.driver.drain_wait_ms, 300);
        assert_eq!(config.driver.drain_extra_rounds, 3);
    }
}
