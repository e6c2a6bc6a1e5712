//! IPC with the accessory server over Unix domain sockets.
//!
//! Two channels, two roles:
//!
//! ```text
//! ┌─────────────┐   request socket (server-owned)   ┌──────────────┐
//! │ application │──────────────────────────────────▶│  accessory   │
//! │  (this lib) │   "<opcode>|<payload>" + reply    │    server    │
//! │             │◀──────────────────────────────────│  (privileged)│
//! │             │   notification socket (lib-owned) │              │
//! │             │◀──────────────────────────────────│              │
//! └─────────────┘   async grant/deny push + ack     └──────────────┘
//! ```
//!
//! The request channel is single-shot: one connection per query, one write,
//! one read, close. The notification channel is bound by this library and
//! serviced one accept cycle at a time from the caller's event loop.

pub mod client;
pub mod listener;
pub mod wire;

use std::path::PathBuf;

pub use client::RequestClient;
pub use listener::NotifyListener;
pub use wire::{Notification, Request, SimpleResult};

/// Errors from the IPC transport and codec.
#[derive(Debug, thiserror::Error)]
pub enum IpcError {
    #[error("accessory server unreachable at {path}: {source}")]
    ServerUnreachable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("transport failed: {0}")]
    Transport(#[source] std::io::Error),

    #[error("malformed accessory record: expected 5 '|' separators, found {found}")]
    MalformedRecord { found: usize },

    #[error("failed to bind notification socket at {path}: {source}")]
    BindFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open notification socket to the server at {path}: {source}")]
    PermissionSetupFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
