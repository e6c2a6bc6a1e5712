//! Connection-status bridge.
//!
//! The platform publishes accessory connection state through a key-value
//! store; this library consumes it as a watch channel whose sender side is
//! owned by the platform integration layer (or a test). The bridge task
//! re-queries the server for a fresh identity record on every transition
//! to connected before invoking the registered callback.

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::accessory::Accessory;
use crate::error::AccessoryError;
use crate::ipc::RequestClient;

/// Status key value: no accessory attached.
pub const STATUS_DISCONNECTED: i32 = 0;
/// Status key value: an accessory is attached.
pub const STATUS_CONNECTED: i32 = 1;

/// Connection-changed callback.
///
/// Invoked with the freshly fetched record (borrowed for the duration of
/// the call only) on connect, and with `None` on disconnect. Application
/// state rides along in the closure's captures.
pub type ConnectionCallback = Box<dyn FnMut(Option<&Accessory>, bool) + Send>;

/// Read handle on the platform's accessory-status key.
///
/// Cheap to clone; every clone observes the same key.
#[derive(Debug, Clone)]
pub struct StatusKey {
    rx: watch::Receiver<i32>,
}

impl StatusKey {
    /// Create a status key backed by an in-process channel. The sender
    /// half belongs to whatever feeds platform state into the process.
    pub fn channel(initial: i32) -> (watch::Sender<i32>, Self) {
        let (tx, rx) = watch::channel(initial);
        (tx, Self { rx })
    }

    /// Read the current status value.
    ///
    /// Fails with `OperationFailed` once the publisher side is gone; the
    /// key is then unreadable for good.
    pub fn read(&self) -> Result<i32, AccessoryError> {
        if self.rx.has_changed().is_err() {
            return Err(AccessoryError::OperationFailed(
                "accessory status key publisher is gone".to_string(),
            ));
        }
        Ok(*self.rx.borrow())
    }

    fn subscribe(&self) -> watch::Receiver<i32> {
        self.rx.clone()
    }
}

/// A running connection-watch registration. Dropping it unsubscribes.
#[derive(Debug)]
pub(crate) struct ConnectionWatch {
    task: JoinHandle<()>,
}

impl ConnectionWatch {
    /// Subscribe to the status key and dispatch changes to `callback`
    /// until unregistered or the publisher goes away.
    pub(crate) fn spawn(
        status: &StatusKey,
        client: RequestClient,
        mut callback: ConnectionCallback,
    ) -> Self {
        let mut rx = status.subscribe();
        let task = tokio::spawn(async move {
            loop {
                if rx.changed().await.is_err() {
                    warn!("accessory status key publisher is gone; stopping watch");
                    break;
                }
                let value = *rx.borrow_and_update();
                match value {
                    STATUS_DISCONNECTED => {
                        debug!("accessory disconnected");
                        callback(None, false);
                    }
                    STATUS_CONNECTED => match client.accessory_info().await {
                        Ok(record) => {
                            debug!(serial = record.serial(), "accessory connected");
                            callback(Some(&record), true);
                            // record dropped here; callbacks only borrow it
                        }
                        Err(e) => {
                            warn!(error = %e, "failed to fetch accessory info after connect");
                        }
                    },
                    other => {
                        warn!(status = other, "ignoring unknown accessory status value");
                    }
                }
            }
        });
        Self { task }
    }
}

impl Drop for ConnectionWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}
