//! Local subprocess variant of the managed process
//!
//! Runs the language's interpreter directly (`bash`, `python -i -q -u`, …)
//! with all three standard streams piped. Output bytes are pumped into the
//! same line-assembly channels the container bridge uses, so the driver's
//! readers are identical across both variants.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::ManagedProcess;
use crate::bridge::OutputLines;
use crate::errors::RuncellError;

pub struct LocalProcess {
    command: Vec<String>,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stdout: Option<OutputLines>,
    stderr: Option<OutputLines>,
    pumps: Vec<JoinHandle<()>>,
}

impl LocalProcess {
    /// Build from a whitespace-separated command line.
    pub fn from_command(command: &str) -> Self {
        Self {
            command: command.split_whitespace().map(str::to_string).collect(),
            child: None,
            stdin: None,
            stdout: None,
            stderr: None,
            pumps: Vec::new(),
        }
    }
}

#[async_trait]
impl ManagedProcess for LocalProcess {
    async fn start(&mut self) -> Result<(), RuncellError> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| RuncellError::ProcessStart("empty start command".to_string()))?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RuncellError::ProcessStart(format!("{}: {}", program, e)))?;

        self.stdin = child.stdin.take();

        let (stdout_tx, stdout) = OutputLines::channel();
        let (stderr_tx, stderr) = OutputLines::channel();
        if let Some(pipe) = child.stdout.take() {
            self.pumps.push(tokio::spawn(pump_bytes(pipe, stdout_tx)));
        }
        if let Some(pipe) = child.stderr.take() {
            self.pumps.push(tokio::spawn(pump_bytes(pipe, stderr_tx)));
        }
        self.stdout = Some(stdout);
        self.stderr = Some(stderr);
        self.child = Some(child);
        log::debug!("started local process: {}", self.command.join(" "));
        Ok(())
    }

    async fn write_input(&mut self, text: &str) -> Result<(), RuncellError> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or(RuncellError::ProcessNotStarted)?;
        stdin
            .write_all(text.as_bytes())
            .await
            .map_err(|e| RuncellError::SubmissionWrite(e.to_string()))?;
        stdin
            .flush()
            .await
            .map_err(|e| RuncellError::SubmissionWrite(e.to_string()))?;
        Ok(())
    }

    fn take_stdout(&mut self) -> Option<OutputLines> {
        self.stdout.take()
    }

    fn take_stderr(&mut self) -> Option<OutputLines> {
        self.stderr.take()
    }

    async fn terminate(&mut self) {
        // Closing stdin first lets well-behaved interpreters exit on EOF.
        self.stdin = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill().await;
        }
        for pump in self.pumps.drain(..) {
            let _ = pump.await;
        }
    }
}

/// Forward raw bytes from one child pipe into a line-assembly channel.
async fn pump_bytes<R>(mut pipe: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut chunk = vec![0u8; 1024];
    loop {
        match pipe.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if tx
                    .send(String::from_utf8_lossy(&chunk[..n]).into_owned())
                    .is_err()
                {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::LineRead;
    use std::time::Duration;

    #[tokio::test]
    async fn runs_a_shell_and_reads_its_output() {
        let mut process = LocalProcess::from_command("bash");
        process.start().await.unwrap();
        let mut stdout = process.take_stdout().unwrap();

        process.write_input("echo hello\n").await.unwrap();
        assert_eq!(
            stdout.read_line(Duration::from_secs(5)).await,
            LineRead::Line("hello".to_string())
        );
        process.terminate().await;
    }

    #[tokio::test]
    async fn write_after_terminate_fails() {
        let mut process = LocalProcess::from_command("bash");
        process.start().await.unwrap();
        process.terminate().await;

        let err = process.write_input("echo hello\n").await.unwrap_err();
        assert!(matches!(err, RuncellError::ProcessNotStarted));
    }

    #[tokio::test]
    async fn missing_binary_is_a_start_error() {
        let mut process = LocalProcess::from_command("definitely-not-a-real-binary-42");
        let err = process.start().await.unwrap_err();
        assert!(matches!(err, RuncellError::ProcessStart(_)));
    }
}
