use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::{oneshot, Mutex};

use crate::Error;

/// Output shared by both relays of a log stream.
pub type LogSink<W> = Arc<Mutex<W>>;

const CHUNK_SIZE: usize = 4096;

/// Relays a remote log-tailing command to a local sink as output arrives.
pub struct LogStreamer;

impl LogStreamer {
    /// Spawn `command` and relay its stdout and stderr into `sink`.
    ///
    /// The receiver yields an error if the command cannot start, a read
    /// fails, or it exits unsuccessfully. It closes without a value when the
    /// command ends cleanly. Both relays finish before anything is reported.
    pub fn start<W>(mut command: Command, sink: LogSink<W>) -> oneshot::Receiver<Error>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();

        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                let _ = tx.send(Error::LogStream(format!("failed to start log stream: {e}")));
                return rx;
            }
        };
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        tokio::spawn(async move {
            let (out, err) = tokio::join!(relay(stdout, &sink), relay(stderr, &sink));
            let status = child.wait().await;

            let failure = match (out, err, status) {
                (Err(e), _, _) | (_, Err(e), _) => Some(format!("failed to relay log output: {e}")),
                (_, _, Err(e)) => Some(format!("failed to wait for log stream: {e}")),
                (_, _, Ok(status)) if !status.success() => Some(format!("log stream exited with {status}")),
                _ => None,
            };

            match failure {
                Some(reason) => {
                    tracing::warn!("{}", reason);
                    let _ = tx.send(Error::LogStream(reason));
                }
                None => tracing::debug!("Log stream finished"),
            }
        });

        rx
    }
}

async fn relay<R, W>(reader: Option<R>, sink: &LogSink<W>) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let Some(mut reader) = reader else { return Ok(()) };
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        let mut sink = sink.lock().await;
        sink.write_all(&buf[..n]).await?;
        sink.flush().await?;
    }
}
