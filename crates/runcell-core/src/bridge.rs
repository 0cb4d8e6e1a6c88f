//! Bidirectional bridge between one exec socket and line-oriented endpoints
//!
//! One background task owns the socket and relays in both directions:
//! inbound bytes run through the frame decoder and fan out to independent
//! stdout/stderr channels; queued stdin text is unescaped, buffered, and
//! forwarded to the socket one complete newline-terminated line at a time.
//! Line readers block on channel waits with a caller-supplied timeout, never
//! by spinning. The two output channels are independent: ordering holds
//! within each, not across them.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::engine::BoxedExecSocket;
use crate::errors::RuncellError;
use crate::frame::FrameDecoder;

pub(crate) const READ_CHUNK_SIZE: usize = 2048;

/// Outcome of one bounded line read.
#[derive(Debug, PartialEq, Eq)]
pub enum LineRead {
    /// A complete line, trailing newline stripped.
    Line(String),
    /// No complete line arrived within the timeout.
    Timeout,
    /// The producing side is gone; no further lines will arrive.
    Closed,
}

/// Reader half of one logical output stream. Text chunks arrive over a
/// channel and are assembled into lines here; a trailing partial line is
/// retained until its newline shows up.
pub struct OutputLines {
    rx: mpsc::UnboundedReceiver<String>,
    buffer: String,
}

impl OutputLines {
    pub(crate) fn channel() -> (mpsc::UnboundedSender<String>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            tx,
            Self {
                rx,
                buffer: String::new(),
            },
        )
    }

    /// Block until a newline is available or the timeout elapses.
    pub async fn read_line(&mut self, timeout: Duration) -> LineRead {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(pos) = self.buffer.find('\n') {
                let line = self.buffer[..pos].to_string();
                self.buffer.drain(..=pos);
                return LineRead::Line(line);
            }
            match tokio::time::timeout_at(deadline, self.rx.recv()).await {
                Ok(Some(chunk)) => self.buffer.push_str(&chunk),
                Ok(None) => return LineRead::Closed,
                Err(_) => return LineRead::Timeout,
            }
        }
    }
}

/// Writer handle for the process's stdin. Cheap to clone; text is relayed by
/// the bridge task, which performs the unescaping and line-splitting.
#[derive(Clone)]
pub struct StdinWriter {
    tx: mpsc::UnboundedSender<String>,
}

impl StdinWriter {
    pub fn write(&self, text: &str) -> Result<(), RuncellError> {
        self.tx
            .send(text.to_string())
            .map_err(|_| RuncellError::SubmissionWrite("stream bridge is gone".to_string()))
    }
}

/// Owns one exec socket and the background task demultiplexing it.
pub struct StreamBridge {
    stdin: StdinWriter,
    stdout: Option<OutputLines>,
    stderr: Option<OutputLines>,
    stop: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl StreamBridge {
    pub fn new(socket: BoxedExecSocket) -> Self {
        let (stdout_tx, stdout) = OutputLines::channel();
        let (stderr_tx, stderr) = OutputLines::channel();
        let (stdin_tx, stdin_rx) = mpsc::unbounded_channel();
        let stop = CancellationToken::new();
        let (read_half, write_half) = tokio::io::split(socket);
        let task = tokio::spawn(pump_socket(
            read_half,
            write_half,
            stdout_tx,
            stderr_tx,
            stdin_rx,
            stop.clone(),
        ));
        Self {
            stdin: StdinWriter { tx: stdin_tx },
            stdout: Some(stdout),
            stderr: Some(stderr),
            stop,
            task: Some(task),
        }
    }

    pub fn stdin(&self) -> StdinWriter {
        self.stdin.clone()
    }

    /// Take the stdout line reader. Available once.
    pub fn take_stdout(&mut self) -> Option<OutputLines> {
        self.stdout.take()
    }

    /// Take the stderr line reader. Available once.
    pub fn take_stderr(&mut self) -> Option<OutputLines> {
        self.stderr.take()
    }

    /// Stop the background task, join it, and release the socket.
    pub async fn shutdown(mut self) {
        self.stop.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

async fn pump_socket(
    mut read_half: ReadHalf<BoxedExecSocket>,
    mut write_half: WriteHalf<BoxedExecSocket>,
    stdout_tx: mpsc::UnboundedSender<String>,
    stderr_tx: mpsc::UnboundedSender<String>,
    mut stdin_rx: mpsc::UnboundedReceiver<String>,
    stop: CancellationToken,
) {
    let mut decoder = FrameDecoder::new();
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];
    let mut stdin_buffer = String::new();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            read = read_half.read(&mut chunk) => match read {
                Ok(0) => {
                    log::debug!("exec socket closed by remote");
                    break;
                }
                Ok(n) => {
                    let (stdout, stderr) = decoder.push(&chunk[..n]);
                    if !stdout.is_empty() {
                        let _ = stdout_tx.send(stdout);
                    }
                    if !stderr.is_empty() {
                        let _ = stderr_tx.send(stderr);
                    }
                }
                Err(err) => {
                    log::warn!("exec socket read failed: {}", err);
                    break;
                }
            },
            queued = stdin_rx.recv(), if stdin_open => match queued {
                Some(text) => {
                    stdin_buffer.push_str(&unescape_input(&text));
                    if !forward_lines(&mut write_half, &mut stdin_buffer).await {
                        break;
                    }
                }
                None => stdin_open = false,
            },
        }
    }
    // Channels close when the senders drop here; readers observe Closed.
}

/// Send every complete line in `buffer` to the socket, leaving any trailing
/// partial line in place. Returns false when the socket write fails.
async fn forward_lines(
    write_half: &mut WriteHalf<BoxedExecSocket>,
    buffer: &mut String,
) -> bool {
    while let Some(pos) = buffer.find('\n') {
        let line: String = buffer.drain(..=pos).collect();
        if let Err(err) = write_half.write_all(line.as_bytes()).await {
            log::warn!("exec socket write failed: {}", err);
            return false;
        }
    }
    if let Err(err) = write_half.flush().await {
        log::warn!("exec socket flush failed: {}", err);
        return false;
    }
    true
}

/// Undo the writer-side escaping convention: backslash-escaped quotes become
/// bare quotes and literal `\n` sequences become real newlines. All other
/// backslashes pass through untouched.
fn unescape_input(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.peek().copied() {
                Some(quote) if quote == '"' || quote == '\'' => {
                    chars.next();
                    out.push(quote);
                }
                Some('n') => {
                    chars.next();
                    out.push('\n');
                }
                _ => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::time::Instant;

    fn bridged_pair() -> (StreamBridge, tokio::io::DuplexStream) {
        let (local, remote) = tokio::io::duplex(64 * 1024);
        (StreamBridge::new(Box::new(local)), remote)
    }

    #[tokio::test]
    async fn stdin_line_echoed_as_stdout_frame_surfaces_as_line() {
        let (mut bridge, mut remote) = bridged_pair();
        let mut stdout = bridge.take_stdout().unwrap();

        let remote_task = tokio::spawn(async move {
            let mut received = vec![0u8; 64];
            let n = remote.read(&mut received).await.unwrap();
            assert_eq!(&received[..n], b"print(1)\n");
            remote
                .write_all(&frame::encode(1, b"1\n"))
                .await
                .unwrap();
            remote
        });

        bridge.stdin().write("print(1)\n").unwrap();
        assert_eq!(
            stdout.read_line(Duration::from_secs(2)).await,
            LineRead::Line("1".to_string())
        );

        let _remote = remote_task.await.unwrap();
        bridge.shutdown().await;
    }

    #[tokio::test]
    async fn stdout_and_stderr_arrive_on_independent_channels() {
        let (mut bridge, mut remote) = bridged_pair();
        let mut stdout = bridge.take_stdout().unwrap();
        let mut stderr = bridge.take_stderr().unwrap();

        let mut data = frame::encode(2, b"oops\n");
        data.extend(frame::encode(1, b"fine\n"));
        remote.write_all(&data).await.unwrap();

        assert_eq!(
            stderr.read_line(Duration::from_secs(2)).await,
            LineRead::Line("oops".to_string())
        );
        assert_eq!(
            stdout.read_line(Duration::from_secs(2)).await,
            LineRead::Line("fine".to_string())
        );
        bridge.shutdown().await;
    }

    #[tokio::test]
    async fn read_line_times_out_without_blocking_past_the_deadline() {
        let (mut bridge, _remote) = bridged_pair();
        let mut stdout = bridge.take_stdout().unwrap();

        let started = Instant::now();
        let result = stdout.read_line(Duration::from_millis(100)).await;
        let elapsed = started.elapsed();

        assert_eq!(result, LineRead::Timeout);
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_secs(1));
        bridge.shutdown().await;
    }

    #[tokio::test]
    async fn escaped_input_is_unescaped_before_forwarding() {
        let (bridge, mut remote) = bridged_pair();

        bridge
            .stdin()
            .write("echo \\\"hi\\\" and \\'there\\'\\n")
            .unwrap();

        let mut received = vec![0u8; 64];
        let n = remote.read(&mut received).await.unwrap();
        assert_eq!(&received[..n], b"echo \"hi\" and 'there'\n");
        bridge.shutdown().await;
    }

    #[tokio::test]
    async fn partial_stdin_line_is_held_until_its_newline_arrives() {
        let (bridge, mut remote) = bridged_pair();
        let stdin = bridge.stdin();

        stdin.write("echo h").unwrap();
        stdin.write("i\n").unwrap();

        let mut received = vec![0u8; 64];
        let n = remote.read(&mut received).await.unwrap();
        assert_eq!(&received[..n], b"echo hi\n");
        bridge.shutdown().await;
    }

    #[tokio::test]
    async fn frame_split_across_reads_still_yields_the_line() {
        let (mut bridge, mut remote) = bridged_pair();
        let mut stdout = bridge.take_stdout().unwrap();

        let data = frame::encode(1, b"split\n");
        remote.write_all(&data[..5]).await.unwrap();
        remote.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        remote.write_all(&data[5..]).await.unwrap();

        assert_eq!(
            stdout.read_line(Duration::from_secs(2)).await,
            LineRead::Line("split".to_string())
        );
        bridge.shutdown().await;
    }

    #[tokio::test]
    async fn remote_close_surfaces_as_closed() {
        let (mut bridge, remote) = bridged_pair();
        let mut stdout = bridge.take_stdout().unwrap();
        drop(remote);

        assert_eq!(
            stdout.read_line(Duration::from_secs(2)).await,
            LineRead::Closed
        );
        bridge.shutdown().await;
    }

    #[test]
    fn unescape_leaves_unrelated_backslashes_alone() {
        assert_eq!(unescape_input(r"a\\b\tc"), r"a\\b\tc");
        assert_eq!(unescape_input(r"say \'hi\'"), "say 'hi'");
        assert_eq!(unescape_input(r"one\ntwo"), "one\ntwo");
    }
}
