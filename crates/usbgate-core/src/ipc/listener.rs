//! Notification listener for asynchronous permission decisions.
//!
//! The library plays the server role on this channel: it binds a socket at
//! a well-known path, opens its permissions so the privileged accessory
//! server can connect back, and services exactly one accept cycle per
//! armed permission request. The accepted connection is read once,
//! acknowledged with a fixed result code, and closed.

use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixSocket, UnixStream};
use tracing::{debug, warn};

use super::wire::{MAX_MSG_LEN, Notification, SimpleResult};
use super::IpcError;

/// Listen backlog. This is an at-most-one-outstanding-request channel;
/// a small queue is plenty.
const NOTIFY_BACKLOG: u32 = 5;

/// Bound notification socket, torn down (including the socket file) on drop.
///
/// Readiness can be polled from an external event loop via [`AsRawFd`];
/// [`recv_decision`](NotifyListener::recv_decision) services one accept
/// cycle once the fd signals readable.
#[derive(Debug)]
pub struct NotifyListener {
    listener: UnixListener,
    socket_path: PathBuf,
}

impl NotifyListener {
    /// Bind the notification socket and open it to the server process.
    ///
    /// Any stale socket file at the path is removed first. `mode` is
    /// applied unconditionally; `owner` (uid, gid) is applied when the
    /// embedding process is privileged enough to reassign ownership.
    /// Permission failures are fatal for the notification feature but are
    /// surfaced as errors, never panics.
    pub fn bind(
        path: impl Into<PathBuf>,
        mode: u32,
        owner: Option<(u32, u32)>,
    ) -> Result<Self, IpcError> {
        let socket_path = path.into();

        let bind_err = |source: std::io::Error| IpcError::BindFailed {
            path: socket_path.clone(),
            source,
        };
        let perm_err = |source: std::io::Error| IpcError::PermissionSetupFailed {
            path: socket_path.clone(),
            source,
        };

        if socket_path.exists() {
            std::fs::remove_file(&socket_path).map_err(bind_err)?;
        }

        let socket = UnixSocket::new_stream().map_err(bind_err)?;
        socket.bind(&socket_path).map_err(bind_err)?;

        // The server runs as a different user and must be able to connect.
        std::fs::set_permissions(&socket_path, std::fs::Permissions::from_mode(mode))
            .map_err(perm_err)?;
        if let Some((uid, gid)) = owner {
            std::os::unix::fs::chown(&socket_path, Some(uid), Some(gid)).map_err(perm_err)?;
        }

        let listener = socket.listen(NOTIFY_BACKLOG).map_err(bind_err)?;
        debug!(path = %socket_path.display(), "notification socket listening");

        Ok(Self {
            listener,
            socket_path,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Service one accept cycle: accept a connection, read one message,
    /// acknowledge it, and decode the decision.
    ///
    /// Returns `Ok(None)` when the message was not a recognized decision:
    /// it is logged and dropped, and the cycle still counts as serviced.
    /// The accepted connection is closed on every path.
    pub async fn recv_decision(&self) -> Result<Option<Notification>, IpcError> {
        let (mut stream, _) = self.listener.accept().await.map_err(IpcError::Transport)?;

        let message = match read_message(&mut stream).await {
            Ok(message) => message,
            Err(e) => {
                write_ack(&mut stream, SimpleResult::Fail).await;
                return Err(IpcError::Transport(e));
            }
        };
        write_ack(&mut stream, SimpleResult::Success).await;

        match Notification::from_wire(&message) {
            Some(decision) => {
                debug!(?decision, "permission decision received");
                Ok(Some(decision))
            }
            None => {
                warn!(message = %message, "dropping unrecognized notification");
                Ok(None)
            }
        }
    }
}

impl AsRawFd for NotifyListener {
    fn as_raw_fd(&self) -> RawFd {
        self.listener.as_raw_fd()
    }
}

impl Drop for NotifyListener {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.socket_path) {
            debug!(path = %self.socket_path.display(), error = %e, "notification socket file not removed");
        }
    }
}

/// Read the single notification message, retrying on interrupted reads.
///
/// A zero-byte read is the peer closing without payload; it decodes as an
/// empty (and therefore unrecognized) message rather than an error, per
/// the single-read contract of the channel.
async fn read_message(stream: &mut UnixStream) -> std::io::Result<String> {
    let mut buf = vec![0u8; MAX_MSG_LEN];
    loop {
        match stream.read(&mut buf).await {
            Ok(n) => {
                buf.truncate(n);
                return Ok(String::from_utf8_lossy(&buf)
                    .trim_end_matches('\0')
                    .to_string());
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Write the fixed acknowledgement code. Failures are logged, not
/// propagated: the decision still has to be dispatched (or dropped) after
/// a lost ack.
async fn write_ack(stream: &mut UnixStream, result: SimpleResult) {
    let mut ack = result.code().to_string().into_bytes();
    ack.push(0);
    if let Err(e) = stream.write_all(&ack).await {
        warn!(code = result.code(), error = %e, "failed to write notification ack");
    }
}
