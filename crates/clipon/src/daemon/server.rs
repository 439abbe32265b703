//! Service loop: newline-delimited JSON over a Unix socket.

use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinSet;
use tracing::{debug, info, trace, warn};

use super::Daemon;
use crate::error::{Error, Result};
use crate::protocol::{Request, Response};

/// How long open connections get to finish after a stop.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Longest request line accepted, newline included.
pub const MAX_REQUEST_LEN: u64 = 64 * 1024;

/// Bind the service socket at `path`, owner-only.
///
/// A leftover socket file is removed first. Callers must hold the instance
/// lock, which guarantees no live daemon owns it.
///
/// # Errors
///
/// Returns an error if the socket can't be bound.
pub fn bind(path: &Path) -> Result<UnixListener> {
    if path.exists() {
        debug!(path = %path.display(), "Removing stale socket");
        std::fs::remove_file(path)?;
    }

    let listener = UnixListener::bind(path).map_err(|source| Error::FileOpen {
        path: path.to_path_buf(),
        source,
    })?;

    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }

    info!(path = %path.display(), "Listening for clients");
    Ok(listener)
}

/// Remove the socket file, logging rather than failing.
pub fn remove_socket(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "Removed socket"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove socket"),
    }
}

/// Accept clients until the daemon stops.
pub async fn serve(listener: UnixListener, daemon: Daemon) {
    let mut state = daemon.subscribe();
    let mut connections = JoinSet::new();

    loop {
        if state.borrow_and_update().is_stopped() {
            break;
        }
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    trace!("Client connected");
                    let daemon = daemon.clone();
                    connections.spawn(async move {
                        if let Err(e) = handle_connection(stream, daemon).await {
                            debug!(error = %e, "Client connection ended with error");
                        }
                    });
                }
                Err(e) => warn!(error = %e, "Failed to accept client"),
            },
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    // Let the client that asked for the stop read its answer.
    let drain = async { while connections.join_next().await.is_some() {} };
    if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
        debug!(open = connections.len(), "Closing lingering client connections");
        connections.abort_all();
    }
    debug!("Service loop stopped");
}

async fn handle_connection(stream: UnixStream, daemon: Daemon) -> Result<()> {
    let (read, mut write) = stream.into_split();
    let mut reader = BufReader::new(read);
    let mut line = Vec::new();

    loop {
        line.clear();
        let len = (&mut reader)
            .take(MAX_REQUEST_LEN)
            .read_until(b'\n', &mut line)
            .await?;
        if len == 0 {
            break;
        }

        if line.last() != Some(&b'\n') && len as u64 == MAX_REQUEST_LEN {
            warn!(limit = MAX_REQUEST_LEN, "Oversized request, closing connection");
            let response = Response::error(format!("request exceeds {MAX_REQUEST_LEN} bytes"));
            send(&mut write, &response).await?;
            break;
        }

        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        let response = match serde_json::from_slice::<Request>(&line) {
            Ok(request) => daemon.handle(request),
            Err(e) => {
                warn!(error = %e, "Malformed request");
                Response::error(format!("malformed request: {e}"))
            }
        };
        send(&mut write, &response).await?;
    }
    Ok(())
}

async fn send<W: AsyncWrite + Unpin>(write: &mut W, response: &Response) -> Result<()> {
    let mut json = serde_json::to_vec(response)?;
    json.push(b'\n');
    write.write_all(&json).await?;
    Ok(())
}
