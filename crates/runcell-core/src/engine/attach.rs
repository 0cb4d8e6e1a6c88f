//! Exec attach over the engine's Unix socket
//!
//! Starting an exec instance with `Detach: false` hijacks the HTTP
//! connection: after the response head, the same connection carries the
//! multiplexed output frames inbound and accepts stdin bytes outbound. The
//! request is written by hand because the hijacked connection stops being
//! HTTP the moment the head ends.

use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};

use serde_json::json;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::UnixStream;

use crate::errors::RuncellError;

const MAX_RESPONSE_HEAD: usize = 16 * 1024;

/// The hijacked connection: any bytes read past the response head are served
/// before the socket is read again.
#[derive(Debug)]
pub(crate) struct HijackedSocket {
    stream: UnixStream,
    leftover: Vec<u8>,
}

pub(crate) async fn hijack_exec(
    socket_path: &Path,
    exec_id: &str,
) -> Result<HijackedSocket, RuncellError> {
    let mut stream = UnixStream::connect(socket_path).await.map_err(|e| {
        RuncellError::ExecChannel(format!(
            "cannot connect to engine socket {}: {}",
            socket_path.display(),
            e
        ))
    })?;

    let body = json!({ "Detach": false, "Tty": false }).to_string();
    let request = format!(
        "POST /exec/{}/start HTTP/1.1\r\n\
         Host: docker\r\n\
         Content-Type: application/json\r\n\
         Content-Length: {}\r\n\
         Connection: Upgrade\r\n\
         Upgrade: tcp\r\n\
         \r\n\
         {}",
        exec_id,
        body.len(),
        body
    );
    stream
        .write_all(request.as_bytes())
        .await
        .map_err(|e| RuncellError::ExecChannel(format!("exec start request failed: {}", e)))?;

    // Read until the blank line ending the response head; whatever follows
    // already belongs to the multiplexed stream.
    let mut head = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|e| RuncellError::ExecChannel(format!("exec start response failed: {}", e)))?;
        if n == 0 {
            return Err(RuncellError::ExecChannel(
                "engine closed the connection during exec start".to_string(),
            ));
        }
        head.extend_from_slice(&chunk[..n]);
        if let Some(end) = header_end(&head) {
            let leftover = head.split_off(end + 4);
            check_status(&head)?;
            return Ok(HijackedSocket { stream, leftover });
        }
        if head.len() > MAX_RESPONSE_HEAD {
            return Err(RuncellError::ExecChannel(
                "exec start response head exceeded 16 KiB".to_string(),
            ));
        }
    }
}

fn header_end(head: &[u8]) -> Option<usize> {
    head.windows(4).position(|w| w == b"\r\n\r\n")
}

fn check_status(head: &[u8]) -> Result<(), RuncellError> {
    let text = String::from_utf8_lossy(head);
    let status_line = text.lines().next().unwrap_or("");
    // 101 when the engine honors the upgrade; some versions answer 200 and
    // hijack anyway.
    if status_line.contains(" 101 ") || status_line.contains(" 200 ") {
        Ok(())
    } else {
        Err(RuncellError::ExecChannel(format!(
            "exec start rejected: {}",
            status_line
        )))
    }
}

impl AsyncRead for HijackedSocket {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        if !self.leftover.is_empty() {
            let n = self.leftover.len().min(buf.remaining());
            buf.put_slice(&self.leftover[..n]);
            self.leftover.drain(..n);
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for HijackedSocket {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }
}
