//! Request/response client for the accessory server socket.
//!
//! One connection per query: connect, send the encoded line, wait for the
//! single reply, close. The server delivers exactly one response per
//! request and the connection is never reused, so the stream read boundary
//! is the response boundary; there is no length prefix. Safe to call from
//! any number of tasks concurrently, every call opens its own connection.

use std::path::{Path, PathBuf};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tracing::debug;

use super::wire::{self, MAX_MSG_LEN, Request, SimpleResult};
use super::IpcError;
use crate::accessory::Accessory;

/// Client for the accessory server's request socket.
#[derive(Debug, Clone)]
pub struct RequestClient {
    socket_path: PathBuf,
}

impl RequestClient {
    /// Create a client targeting the given server socket path.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Send one encoded request and wait for the single reply.
    ///
    /// The protocol defines no timeout; a hung server hangs this call.
    /// Callers needing bounded latency wrap it in `tokio::time::timeout`.
    pub async fn query(&self, opcode: i32, payload: &str) -> Result<String, IpcError> {
        let mut stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|e| IpcError::ServerUnreachable {
                path: self.socket_path.clone(),
                source: e,
            })?;

        debug!(opcode, payload, "sending request to accessory server");

        // The server parses C strings: the line goes out NUL-terminated.
        let mut line = wire::encode_request(opcode, payload).into_bytes();
        line.push(0);
        stream.write_all(&line).await.map_err(IpcError::Transport)?;

        let mut buf = vec![0u8; MAX_MSG_LEN];
        let n = stream.read(&mut buf).await.map_err(IpcError::Transport)?;
        if n == 0 {
            return Err(IpcError::Transport(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "server closed the connection before replying",
            )));
        }
        buf.truncate(n);

        let reply = String::from_utf8_lossy(&buf)
            .trim_end_matches('\0')
            .to_string();
        debug!(opcode, reply = %reply, "accessory server replied");
        Ok(reply)
        // stream dropped here; the connection closes on every path
    }

    /// Fetch and decode the attached accessory's identity record.
    pub async fn accessory_info(&self) -> Result<Accessory, IpcError> {
        let reply = self.query(Request::GetAccessoryInfo.code(), "").await?;
        wire::decode_record(&reply)
    }

    /// Ask whether `app_id` already holds permission for the accessory.
    pub async fn has_permission(&self, app_id: &str) -> Result<SimpleResult, IpcError> {
        let reply = self.query(Request::HasPermission.code(), app_id).await?;
        Ok(SimpleResult::from_wire(&reply))
    }

    /// Ask the server to start the host permission-grant flow for `app_id`.
    ///
    /// The decision itself arrives later on the notification channel; the
    /// synchronous reply content carries no contract and is discarded.
    pub async fn request_permission(&self, app_id: &str) -> Result<(), IpcError> {
        let reply = self.query(Request::RequestPermission.code(), app_id).await?;
        debug!(reply = %reply, "permission request accepted by server");
        Ok(())
    }
}
