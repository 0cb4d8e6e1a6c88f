//! Process driver
//!
//! One interface for "run code, get a sequence of output events", whether
//! execution happens in a local subprocess or inside a session container.
//! The driver owns the retry state machine: a failed submission write emits
//! diagnostic events, restarts the underlying process, and tries again up to
//! the configured bound; exhausting the bound ends the sequence with a
//! terminal diagnostic and tears the process down so the next call starts
//! fresh.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::bridge::{LineRead, OutputLines};
use crate::config::DriverConfig;
use crate::core_types::OutputEvent;
use crate::errors::RuncellError;
use crate::languages::LanguageAdapter;

mod container;
mod local;

pub use container::ContainerProcess;
pub use local::LocalProcess;

/// How long reader tasks wait per line poll before checking for shutdown.
const READ_POLL: Duration = Duration::from_secs(1);

/// Stderr substring treated as an execution-ending interruption notice.
const INTERRUPT_SIGNAL: &str = "KeyboardInterrupt";

const RESTARTING_MESSAGE: &str = "Restarting process.";
const MAX_RETRIES_MESSAGE: &str = "Maximum retries reached. Could not execute code.";

/// Uniform surface over a local subprocess or a containerized exec shell.
#[async_trait]
pub trait ManagedProcess: Send {
    /// Start (or restart) the underlying process.
    async fn start(&mut self) -> Result<(), RuncellError>;

    /// Write text to the process's input channel and flush it.
    async fn write_input(&mut self, text: &str) -> Result<(), RuncellError>;

    /// Take the stdout line stream. Available once per start.
    fn take_stdout(&mut self) -> Option<OutputLines>;

    /// Take the stderr line stream. Available once per start.
    fn take_stderr(&mut self) -> Option<OutputLines>;

    /// Tear the process down, releasing its sockets and pipes.
    async fn terminate(&mut self);
}

pub struct ProcessDriver {
    process: Box<dyn ManagedProcess>,
    adapter: Arc<dyn LanguageAdapter>,
    config: DriverConfig,
    queue_tx: mpsc::UnboundedSender<OutputEvent>,
    queue_rx: mpsc::UnboundedReceiver<OutputEvent>,
    done: Arc<AtomicBool>,
    readers: Vec<JoinHandle<()>>,
    started: bool,
}

impl ProcessDriver {
    pub fn new(
        process: Box<dyn ManagedProcess>,
        adapter: Arc<dyn LanguageAdapter>,
        config: DriverConfig,
    ) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Self {
            process,
            adapter,
            config,
            queue_tx,
            queue_rx,
            done: Arc::new(AtomicBool::new(false)),
            readers: Vec::new(),
            started: false,
        }
    }

    /// Driver running the adapter's interpreter as a local subprocess.
    pub fn local(adapter: Arc<dyn LanguageAdapter>, config: DriverConfig) -> Self {
        let process = LocalProcess::from_command(adapter.start_command());
        Self::new(Box::new(process), adapter, config)
    }

    /// Driver running inside the session's container. The adapter's
    /// interpreter command is written as the first line into the exec shell.
    pub fn containerized(
        engine: Arc<dyn crate::engine::ContainerEngine>,
        session: crate::session::Session,
        container: crate::config::ContainerConfig,
        adapter: Arc<dyn LanguageAdapter>,
        config: DriverConfig,
    ) -> Self {
        let process =
            ContainerProcess::new(engine, session, container, adapter.start_command());
        Self::new(Box::new(process), adapter, config)
    }

    /// Submit one code block and stream back its output events. The stream
    /// ends when completion is detected or retries are exhausted; failures
    /// surface as diagnostic output events rather than panics, so a
    /// long-running caller survives any single submission.
    pub fn run<'a>(&'a mut self, code: &str) -> impl Stream<Item = OutputEvent> + 'a {
        let code = self.adapter.preprocess(code);
        async_stream::stream! {
            self.done.store(false, Ordering::SeqCst);

            if !self.started {
                if let Err(err) = self.start_process().await {
                    yield OutputEvent::output(err.to_string());
                    return;
                }
            }

            log::debug!("submitting code block:\n{}\n---", code);
            let payload = format!("{}\n", code);
            let mut attempt: u32 = 0;
            loop {
                match self.process.write_input(&payload).await {
                    Ok(()) => break,
                    Err(err) => {
                        yield OutputEvent::output(err.to_string());
                        if attempt >= self.config.max_retries {
                            yield OutputEvent::output(MAX_RETRIES_MESSAGE.to_string());
                            self.stop_process().await;
                            return;
                        }
                        attempt += 1;
                        yield OutputEvent::output(format!(
                            "Retrying... ({}/{})",
                            attempt, self.config.max_retries
                        ));
                        yield OutputEvent::output(RESTARTING_MESSAGE.to_string());
                        self.stop_process().await;
                        if let Err(restart_err) = self.start_process().await {
                            yield OutputEvent::output(restart_err.to_string());
                            self.stop_process().await;
                            return;
                        }
                    }
                }
            }

            // Drain the queue: anything already there goes out immediately;
            // otherwise wait briefly for more. After completion is marked, a
            // few bounded extra drains catch last-moment arrivals (heuristic
            // tail flush, see DriverConfig::drain_extra_rounds).
            loop {
                while let Ok(event) = self.queue_rx.try_recv() {
                    yield event;
                }
                match tokio::time::timeout(self.config.drain_wait(), self.queue_rx.recv()).await {
                    Ok(Some(event)) => yield event,
                    Ok(None) => break,
                    Err(_) => {
                        if self.done.load(Ordering::SeqCst) {
                            for _ in 0..self.config.drain_extra_rounds {
                                while let Ok(event) = self.queue_rx.try_recv() {
                                    yield event;
                                }
                                tokio::time::sleep(self.config.drain_extra_pause()).await;
                            }
                            while let Ok(event) = self.queue_rx.try_recv() {
                                yield event;
                            }
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Tear down the underlying process and its readers. The next `run`
    /// starts a fresh process.
    pub async fn shutdown(&mut self) {
        if self.started {
            self.stop_process().await;
        }
    }

    async fn start_process(&mut self) -> Result<(), RuncellError> {
        self.process.start().await?;
        let stdout = self
            .process
            .take_stdout()
            .ok_or_else(|| RuncellError::ProcessStart("stdout stream unavailable".to_string()))?;
        let stderr = self
            .process
            .take_stderr()
            .ok_or_else(|| RuncellError::ProcessStart("stderr stream unavailable".to_string()))?;

        self.done.store(false, Ordering::SeqCst);
        let live = Arc::new(AtomicUsize::new(2));
        self.readers.push(tokio::spawn(pump_lines(
            stdout,
            self.queue_tx.clone(),
            self.done.clone(),
            live.clone(),
            self.adapter.clone(),
            false,
        )));
        self.readers.push(tokio::spawn(pump_lines(
            stderr,
            self.queue_tx.clone(),
            self.done.clone(),
            live,
            self.adapter.clone(),
            true,
        )));
        self.started = true;
        Ok(())
    }

    async fn stop_process(&mut self) {
        self.process.terminate().await;
        for reader in self.readers.drain(..) {
            let _ = reader.await;
        }
        self.started = false;
    }
}

/// Consume one output stream line by line, classify each line through the
/// language adapter's hooks, and push the resulting events onto the queue.
async fn pump_lines(
    mut lines: OutputLines,
    queue: mpsc::UnboundedSender<OutputEvent>,
    done: Arc<AtomicBool>,
    live: Arc<AtomicUsize>,
    adapter: Arc<dyn LanguageAdapter>,
    is_error_stream: bool,
) {
    loop {
        let raw = match lines.read_line(READ_POLL).await {
            LineRead::Line(line) => line,
            LineRead::Timeout => continue,
            LineRead::Closed => break,
        };
        log::trace!("received output line: {}", raw);

        let line = match adapter.postprocess_line(&raw) {
            Some(line) => line,
            None => continue,
        };

        if let Some(active_line) = adapter.detect_active_line(&line) {
            let _ = queue.send(OutputEvent::active_line(Some(active_line)));
        } else if adapter.detect_end_of_execution(&line) {
            let _ = queue.send(OutputEvent::active_line(None));
            done.store(true, Ordering::SeqCst);
        } else if is_error_stream && line.contains(INTERRUPT_SIGNAL) {
            let _ = queue.send(OutputEvent::output(INTERRUPT_SIGNAL.to_string()));
            done.store(true, Ordering::SeqCst);
        } else {
            let _ = queue.send(OutputEvent::output(line));
        }
    }
    // Both streams gone means the process died (or was torn down). Mark
    // completion so the caller-facing drain cannot wait forever on a corpse.
    if live.fetch_sub(1, Ordering::SeqCst) == 1 {
        log::debug!("all output streams closed");
        done.store(true, Ordering::SeqCst);
    }
}
