//! One-shot TCP exchanges with the miner API.
//!
//! The CGMiner API closes the connection after each reply, so every command
//! opens a fresh socket, writes the command bytes with no line ending and
//! reads until the peer hangs up or the deadline passes. The [`Transport`]
//! trait abstracts this exchange, allowing scripted mocks in tests.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{Instant, timeout_at};

use crate::tracing::prelude::*;

/// Default API port of CGMiner-based firmware.
pub const DEFAULT_PORT: u16 = 4028;

/// Wall-clock budget for a whole exchange, connect included.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(3000);

/// Request/response exchange with a miner.
///
/// Implementations never fail: an empty string means the miner did not
/// answer, for whatever reason.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `command` to `host:port` and return everything read back.
    async fn send(&self, host: &str, port: u16, command: &str) -> String;
}

/// Plain TCP transport.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    timeout: Duration,
}

impl TcpTransport {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&self, host: &str, port: u16, command: &str) -> String {
        let deadline = Instant::now() + self.timeout;

        let mut stream = match timeout_at(deadline, TcpStream::connect((host, port))).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                warn!(host, port, error = %e, "Connection to miner failed");
                return String::new();
            }
            Err(_) => {
                warn!(host, port, "Timed out connecting to miner");
                return String::new();
            }
        };

        trace!(tx = %command, "Sending command");
        let written = async {
            stream.write_all(command.as_bytes()).await?;
            stream.flush().await
        };
        if let Err(e) = written.await {
            warn!(host, port, error = %e, "Failed to write command");
            return String::new();
        }

        let mut response = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            match timeout_at(deadline, stream.read(&mut buf)).await {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => response.extend_from_slice(&buf[..n]),
                Ok(Err(e)) => {
                    debug!(host, port, error = %e, "Read from miner failed");
                    break;
                }
                Err(_) => {
                    debug!(host, port, command, "Deadline reached while reading");
                    break;
                }
            }
        }

        // Best effort; the socket is closed on drop either way.
        let _ = stream.shutdown().await;

        let response = String::from_utf8_lossy(&response).into_owned();
        trace!(rx = %response, "Received response");
        response
    }
}

/// Scripted transport for deterministic testing.
///
/// Replies are looked up by exact command text; unscripted commands get an
/// empty reply, as if the miner were unreachable. Every command sent is
/// recorded.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct MockTransport {
    replies: parking_lot::Mutex<std::collections::HashMap<String, String>>,
    sent: parking_lot::Mutex<Vec<String>>,
}

#[cfg(test)]
impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the reply to `command`.
    pub fn reply(self, command: &str, response: &str) -> Self {
        self.replies
            .lock()
            .insert(command.to_string(), response.to_string());
        self
    }

    /// Commands sent so far, in order.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, _host: &str, _port: u16, command: &str) -> String {
        self.sent.lock().push(command.to_string());
        self.replies.lock().get(command).cloned().unwrap_or_default()
    }
}
