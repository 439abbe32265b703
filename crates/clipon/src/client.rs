//! Client side of the service socket.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::trace;

use crate::error::{Error, Result};
use crate::protocol::{Request, Response};

/// Default time allowed for one request/response exchange.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Sends requests to a running daemon, one connection per request.
#[derive(Debug, Clone)]
pub struct Client {
    socket: PathBuf,
    timeout: Duration,
}

impl Client {
    /// A client for the daemon listening at `socket`.
    #[must_use]
    pub fn new(socket: impl AsRef<Path>) -> Self {
        Self {
            socket: socket.as_ref().to_path_buf(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Use `timeout` for each exchange.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The socket this client talks to.
    #[must_use]
    pub fn socket(&self) -> &Path {
        &self.socket
    }

    /// Send `request` and wait for the answer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DaemonNotRunning`] if nothing is listening,
    /// [`Error::Timeout`] if the daemon doesn't answer in time, and an IPC
    /// or JSON error if the exchange fails.
    pub async fn call(&self, request: &Request) -> Result<Response> {
        let exchange = self.exchange(request);
        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| Error::Timeout {
                operation: request.method().to_string(),
            })?
    }

    /// Whether a daemon answers on the socket.
    pub async fn is_running(&self) -> bool {
        self.call(&Request::GetStatus).await.is_ok()
    }

    async fn exchange(&self, request: &Request) -> Result<Response> {
        let stream = UnixStream::connect(&self.socket)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound | ErrorKind::ConnectionRefused => Error::DaemonNotRunning,
                _ => Error::DaemonConnect {
                    path: self.socket.clone(),
                    message: e.to_string(),
                },
            })?;

        let (read, mut write) = stream.into_split();
        let mut line = serde_json::to_vec(request)?;
        line.push(b'\n');
        write.write_all(&line).await?;
        trace!(method = request.method(), "Sent request");

        let mut answer = String::new();
        let read = BufReader::new(read).read_line(&mut answer).await?;
        if read == 0 {
            return Err(Error::ipc("daemon closed the connection without answering"));
        }

        Ok(serde_json::from_str(&answer)?)
    }
}
