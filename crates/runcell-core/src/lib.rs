//! Core library for sandboxed, session-oriented code execution.
//!
//! Given a snippet of code in some language, this crate runs it either in a
//! local subprocess or inside an isolated, reusable container, and streams
//! output back incrementally while detecting execution boundaries.
//!
//! # Architecture Overview
//!
//! The engine is organized around a few cooperating subsystems:
//!
//! - **Frame codec**: parses the multiplexed exec-socket protocol into
//!   per-stream text
//! - **Stream bridge**: turns one duplex exec socket into independent
//!   stdout/stderr line readers and a stdin writer
//! - **Session management**: binds a workspace directory to one labeled,
//!   reusable container with explicit teardown
//! - **Process driver**: submits code, collects classified output events
//!   through a queue, and retries with process restarts on failure
//! - **Language adapters**: per-language hooks for marker injection and
//!   output classification
//! - **Engine abstraction**: the six-operation container-engine surface,
//!   with a Docker implementation

pub mod bridge;
pub mod config;
pub mod core_types;
pub mod driver;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod frame;
pub mod languages;
pub mod session;

pub use bridge::{LineRead, OutputLines, StdinWriter, StreamBridge};
pub use config::{ContainerConfig, DriverConfig, RuncellConfig};
pub use core_types::OutputEvent;
pub use driver::{ContainerProcess, LocalProcess, ManagedProcess, ProcessDriver};
pub use engine::docker::DockerEngine;
pub use engine::ContainerEngine;
pub use errors::RuncellError;
pub use exec::ExecChannel;
pub use languages::{adapter_for, LanguageAdapter};
pub use session::{Session, SessionContainer};
