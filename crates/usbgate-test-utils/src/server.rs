//! A scripted stand-in for the accessory server.
//!
//! [`FakeUsbServer`] binds a request socket in its own temp directory and
//! answers each incoming request with the next scripted reply, recording
//! every request line it receives. The notification-channel helpers play
//! the privileged server's other role: connecting back to a library-owned
//! notification socket to deliver a permission decision.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinHandle;
use tracing::debug;

/// Matches the deployed server's fixed message buffer.
const MSG_BUF_LEN: usize = 1542;

/// A fake accessory server bound to a temp-dir socket.
///
/// The temp directory (and with it both socket paths) is deleted when
/// this value is dropped, guaranteeing cleanup even on panic.
pub struct FakeUsbServer {
    socket_path: PathBuf,
    requests: Arc<Mutex<Vec<String>>>,
    accept_task: JoinHandle<()>,
    temp_dir: TempDir,
}

impl FakeUsbServer {
    /// Start a server that answers requests with `replies`, in order.
    /// Once the script runs out every further request is answered with
    /// `"0"` (the protocol's error code).
    pub async fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let socket_path = temp_dir.path().join("usb_server_sock");
        let listener = UnixListener::bind(&socket_path).expect("failed to bind fake server");

        let requests = Arc::new(Mutex::new(Vec::new()));
        let script: Arc<Mutex<VecDeque<String>>> = Arc::new(Mutex::new(
            replies.into_iter().map(Into::into).collect(),
        ));

        let requests_task = Arc::clone(&requests);
        let accept_task = tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                let mut buf = vec![0u8; MSG_BUF_LEN];
                let Ok(n) = stream.read(&mut buf).await else {
                    continue;
                };
                let request = String::from_utf8_lossy(&buf[..n])
                    .trim_end_matches('\0')
                    .to_string();
                debug!(request = %request, "fake server received request");
                requests_task.lock().unwrap().push(request);

                let reply = script
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or_else(|| "0".to_string());
                let mut bytes = reply.into_bytes();
                bytes.push(0);
                let _ = stream.write_all(&bytes).await;
                // the client closes its end; drop ours too
            }
        });

        Self {
            socket_path,
            requests,
            accept_task,
            temp_dir,
        }
    }

    /// Start a server that answers every request with the same reply.
    pub async fn with_reply(reply: &str) -> Self {
        Self::with_replies(std::iter::repeat_n(reply.to_string(), 64)).await
    }

    /// Path of the request socket.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// A notification-socket path inside this server's temp directory,
    /// for wiring into the library config.
    pub fn notify_path(&self) -> PathBuf {
        self.temp_dir.path().join("usb_acc_sock")
    }

    /// Request lines received so far (NUL framing stripped).
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of requests received so far.
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Drop for FakeUsbServer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

/// Deliver a permission decision to a library notification socket, as the
/// privileged server would, and return the acknowledgement it writes back.
pub async fn push_notification(notify_path: &Path, opcode: i32) -> String {
    push_raw_notification(notify_path, opcode.to_string().as_bytes()).await
}

/// Like [`push_notification`] but with an arbitrary payload, for
/// exercising the unrecognized-message path.
pub async fn push_raw_notification(notify_path: &Path, payload: &[u8]) -> String {
    let mut stream = UnixStream::connect(notify_path)
        .await
        .expect("failed to connect to notification socket");

    let mut message = payload.to_vec();
    message.push(0);
    stream
        .write_all(&message)
        .await
        .expect("failed to push notification");

    let mut buf = [0u8; 64];
    let n = stream
        .read(&mut buf)
        .await
        .expect("failed to read notification ack");
    String::from_utf8_lossy(&buf[..n])
        .trim_end_matches('\0')
        .to_string()
}
