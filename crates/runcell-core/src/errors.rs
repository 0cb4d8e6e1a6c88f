//! Error types for failure handling across the execution engine
//!
//! The taxonomy distinguishes failures by how callers are expected to react:
//! engine API errors abort the call that made them and are never retried at
//! that layer, a container start timeout is fatal to the acquire call that
//! observed it, and submission-write failures are retried by the driver with
//! a process restart between attempts, bounded by the configured retry count.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuncellError {
    #[error("container engine API error: {0}")]
    EngineApi(String),
    #[error("container {container_id} did not reach running state within {timeout:?}")]
    ContainerStartTimeout {
        container_id: String,
        timeout: Duration,
    },
    #[error("exec channel error: {0}")]
    ExecChannel(String),
    #[error("failed to write submission to process input: {0}")]
    SubmissionWrite(String),
    #[error("maximum retries ({max_retries}) reached, could not execute code")]
    RetriesExhausted { max_retries: u32 },
    #[error("process has not been started")]
    ProcessNotStarted,
    #[error("failed to start process: {0}")]
    ProcessStart(String),
    #[error("unknown or unsupported language: {0}")]
    UnsupportedLanguage(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for RuncellError {
    fn from(err: std::io::Error) -> Self {
        RuncellError::Io(err.to_string())
    }
}

impl From<bollard::errors::Error> for RuncellError {
    fn from(err: bollard::errors::Error) -> Self {
        RuncellError::EngineApi(err.to_string())
    }
}

impl From<serde_yaml::Error> for RuncellError {
    fn from(err: serde_yaml::Error) -> Self {
        RuncellError::Config(err.to_string())
    }
}
