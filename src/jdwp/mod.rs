//! Minimal JDWP client: handshake, then `VirtualMachine.Resume`.

pub mod packet;

use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Instant;

use packet::{HANDSHAKE, REPLY_LEN, RESUME_COMMAND};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection lifecycle. Transitions only move forward; any failure closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Unconnected,
    Connected,
    Resumed,
    Closed,
}

#[derive(Error, Debug)]
pub enum JdwpError {
    #[error("failed to connect to {addr}: {reason}")]
    Connect { addr: String, reason: String },

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("resume failed: {0}")]
    Resume(String),

    #[error("{operation} is not valid in state {state:?}")]
    InvalidState {
        operation: &'static str,
        state: HandshakeState,
    },
}

pub struct JdwpClient {
    host: String,
    port: u16,
    timeout: Duration,
    state: HandshakeState,
    stream: Option<TcpStream>,
}

impl JdwpClient {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout: DEFAULT_TIMEOUT,
            state: HandshakeState::Unconnected,
            stream: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Open the socket and exchange the handshake literal. The timeout covers
    /// both the TCP connect and the echoed reply.
    pub async fn connect(&mut self) -> Result<(), JdwpError> {
        if self.state != HandshakeState::Unconnected {
            return Err(JdwpError::InvalidState { operation: "connect", state: self.state });
        }

        let addr = format!("{}:{}", self.host, self.port);
        let deadline = Instant::now() + self.timeout;

        let result = async {
            let mut stream = match tokio::time::timeout_at(deadline, TcpStream::connect(&addr)).await {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    return Err(JdwpError::Connect { addr: addr.clone(), reason: e.to_string() })
                }
                Err(_) => {
                    return Err(JdwpError::Connect {
                        addr: addr.clone(),
                        reason: format!("timed out after {}ms", self.timeout.as_millis()),
                    })
                }
            };
            match tokio::time::timeout_at(deadline, exchange_handshake(&mut stream)).await {
                Ok(Ok(())) => Ok(stream),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(JdwpError::Handshake(format!(
                    "no reply within {}ms",
                    self.timeout.as_millis()
                ))),
            }
        }
        .await;

        match result {
            Ok(stream) => {
                tracing::debug!("JDWP handshake complete on {}", addr);
                self.stream = Some(stream);
                self.state = HandshakeState::Connected;
                Ok(())
            }
            Err(e) => {
                self.state = HandshakeState::Closed;
                Err(e)
            }
        }
    }

    /// Send `VirtualMachine.Resume` and validate the reply's error code.
    pub async fn resume(&mut self) -> Result<(), JdwpError> {
        if self.state != HandshakeState::Connected {
            return Err(JdwpError::InvalidState { operation: "resume", state: self.state });
        }
        let Some(stream) = self.stream.as_mut() else {
            self.state = HandshakeState::Closed;
            return Err(JdwpError::InvalidState { operation: "resume", state: self.state });
        };

        let result = match tokio::time::timeout(self.timeout, exchange_resume(stream)).await {
            Ok(result) => result,
            Err(_) => Err(JdwpError::Resume(format!(
                "no reply within {}ms",
                self.timeout.as_millis()
            ))),
        };

        match result {
            Ok(()) => {
                self.state = HandshakeState::Resumed;
                Ok(())
            }
            Err(e) => {
                self.stream = None;
                self.state = HandshakeState::Closed;
                Err(e)
            }
        }
    }

    /// Close the connection. Valid from any state; repeated calls are no-ops.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
        self.state = HandshakeState::Closed;
    }
}

async fn exchange_handshake(stream: &mut TcpStream) -> Result<(), JdwpError> {
    stream
        .write_all(HANDSHAKE)
        .await
        .map_err(|e| JdwpError::Handshake(format!("failed to send handshake: {e}")))?;

    let mut reply = [0u8; HANDSHAKE.len()];
    stream
        .read_exact(&mut reply)
        .await
        .map_err(|e| JdwpError::Handshake(format!("failed to read handshake response: {e}")))?;

    if &reply != HANDSHAKE {
        return Err(JdwpError::Handshake(format!(
            "unexpected response {:?}",
            String::from_utf8_lossy(&reply)
        )));
    }
    Ok(())
}

async fn exchange_resume(stream: &mut TcpStream) -> Result<(), JdwpError> {
    stream
        .write_all(&RESUME_COMMAND)
        .await
        .map_err(|e| JdwpError::Resume(format!("request failed: {e}")))?;

    let mut reply = [0u8; REPLY_LEN];
    stream
        .read_exact(&mut reply)
        .await
        .map_err(|e| JdwpError::Resume(format!("failed to read reply: {e}")))?;

    match packet::reply_error_code(&reply) {
        0 => Ok(()),
        code => Err(JdwpError::Resume(format!("VM returned error code {code}"))),
    }
}
