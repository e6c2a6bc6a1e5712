//! Accessory session: discovery, permission, and connection callbacks.
//!
//! [`AccessoryManager`] is the application's single entry point. It owns
//! the two optional registrations the protocol allows (one armed
//! permission request, one connection-changed callback) as explicit
//! state instead of process globals, and enforces the one-at-a-time rule
//! with a [`Busy`](AccessoryError::Busy) rejection.

use std::ops::ControlFlow;

use tracing::{debug, warn};
use usbgate_config::AppConfig;

use crate::accessory::{Accessory, AccessoryList};
use crate::error::AccessoryError;
use crate::identity;
use crate::ipc::{Notification, NotifyListener, RequestClient, SimpleResult};
use crate::status::{ConnectionWatch, StatusKey, STATUS_CONNECTED, STATUS_DISCONNECTED};

/// Permission-response callback. Receives the requesting record back, with
/// the decision already applied to its permission flag.
pub type PermissionCallback = Box<dyn FnOnce(Accessory, bool) + Send>;

/// One armed permission request: the originating record, the response
/// callback, and the listener watching for the server's push.
struct PermissionRequest {
    accessory: Accessory,
    callback: PermissionCallback,
    listener: NotifyListener,
}

/// Session handle for talking to the accessory server.
///
/// Construct one per process and pass it wherever accessory access is
/// needed. Queries may run concurrently from multiple tasks; arming a
/// permission request and registering callbacks take `&mut self` and are
/// serialized by ownership.
pub struct AccessoryManager {
    config: AppConfig,
    client: RequestClient,
    status: StatusKey,
    armed: Option<PermissionRequest>,
    connection_watch: Option<ConnectionWatch>,
}

impl AccessoryManager {
    /// Create a session from configuration and the platform status key.
    pub fn new(config: AppConfig, status: StatusKey) -> Self {
        let client = RequestClient::new(config.sockets.server_path());
        Self {
            config,
            client,
            status,
            armed: None,
            connection_watch: None,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// `NotSupported` guard, checked before any transport is touched.
    fn ensure_supported(&self) -> Result<(), AccessoryError> {
        if self.config.platform.emulated {
            warn!("accessory support is not available on an emulated platform");
            return Err(AccessoryError::NotSupported);
        }
        Ok(())
    }

    // ── Discovery ─────────────────────────────────────────────────────

    /// Fetch the list of attached accessories from the server.
    ///
    /// The deployed server reports at most one accessory; the list shape
    /// leaves room for more.
    pub async fn attached(&self) -> Result<AccessoryList, AccessoryError> {
        self.ensure_supported()?;
        let record = self.client.accessory_info().await?;
        Ok(AccessoryList::from(vec![record]))
    }

    /// Visit each attached accessory until the visitor breaks.
    pub async fn for_each_attached<F>(&self, visit: F) -> Result<(), AccessoryError>
    where
        F: FnMut(&Accessory) -> ControlFlow<()>,
    {
        let list = self.attached().await?;
        list.for_each(visit);
        Ok(())
    }

    /// Current connection state from the platform status key.
    pub fn is_connected(&self) -> Result<bool, AccessoryError> {
        self.ensure_supported()?;
        match self.status.read()? {
            STATUS_CONNECTED => Ok(true),
            STATUS_DISCONNECTED => Ok(false),
            other => Err(AccessoryError::OperationFailed(format!(
                "unexpected accessory status value {other}"
            ))),
        }
    }

    // ── Permission ────────────────────────────────────────────────────

    /// Check whether the application holds permission for `accessory`.
    ///
    /// A handle that was already granted short-circuits locally without a
    /// server round trip (the flag is sticky). A fresh grant reported by
    /// the server is recorded on the handle. A missing application
    /// identity reports "not granted" without failing.
    pub async fn has_permission(&self, accessory: &mut Accessory) -> Result<bool, AccessoryError> {
        self.ensure_supported()?;
        if accessory.permission_granted() {
            return Ok(true);
        }

        let Some(app_id) = identity::resolve_app_id(&self.config.client) else {
            debug!("no application identity; reporting no permission");
            return Ok(false);
        };

        match self.client.has_permission(&app_id).await? {
            SimpleResult::Success => {
                accessory.grant();
                Ok(true)
            }
            result => {
                debug!(code = result.code(), "server reports no permission");
                Ok(false)
            }
        }
    }

    /// Ask the host to grant permission for `accessory`.
    ///
    /// The listener is armed *before* the request goes out (the server's
    /// push must not be able to race ahead of listener setup) and torn
    /// down again if the request fails, leaving nothing armed. The
    /// decision arrives later via
    /// [`dispatch_permission_response`](Self::dispatch_permission_response);
    /// `callback` receives the record back with the decision applied.
    ///
    /// At most one request can be in flight; a second one is rejected
    /// with [`Busy`](AccessoryError::Busy).
    pub async fn request_permission<F>(
        &mut self,
        accessory: Accessory,
        callback: F,
    ) -> Result<(), AccessoryError>
    where
        F: FnOnce(Accessory, bool) + Send + 'static,
    {
        self.ensure_supported()?;
        if self.armed.is_some() {
            return Err(AccessoryError::Busy);
        }
        let app_id = identity::resolve_app_id(&self.config.client)
            .ok_or(AccessoryError::InvalidParameter("application identity unavailable"))?;

        let listener = NotifyListener::bind(
            self.config.sockets.notify_path(),
            self.config.sockets.notify_mode,
            self.config.sockets.notify_owner(),
        )?;

        if let Err(e) = self.client.request_permission(&app_id).await {
            // Roll back: the listener (and its socket file) goes away and
            // nothing stays armed.
            drop(listener);
            return Err(e.into());
        }

        self.armed = Some(PermissionRequest {
            accessory,
            callback: Box::new(callback),
            listener,
        });
        Ok(())
    }

    /// Whether a permission request is currently armed.
    pub fn permission_request_pending(&self) -> bool {
        self.armed.is_some()
    }

    /// The armed listener, for readiness integration into an external
    /// event loop (`AsRawFd`).
    pub fn notify_listener(&self) -> Option<&NotifyListener> {
        self.armed.as_ref().map(|req| &req.listener)
    }

    /// Service the armed listener's one accept cycle and dispatch the
    /// decision.
    ///
    /// Returns `Ok(Some(granted))` after invoking the callback exactly
    /// once, `Ok(None)` when the notification was unrecognized (logged and
    /// dropped, callback never invoked). The armed context is released on
    /// every path, including errors and future cancellation, so a new
    /// request can be made afterwards; the callback is only ever invoked
    /// with a definitive decision.
    pub async fn dispatch_permission_response(&mut self) -> Result<Option<bool>, AccessoryError> {
        let Some(request) = self.armed.take() else {
            return Err(AccessoryError::InvalidParameter("no permission request armed"));
        };
        let PermissionRequest {
            mut accessory,
            callback,
            listener,
        } = request;

        let decision = listener.recv_decision().await?;
        drop(listener);

        match decision {
            Some(Notification::PermissionGranted) => {
                accessory.grant();
                callback(accessory, true);
                Ok(Some(true))
            }
            Some(Notification::PermissionDenied) => {
                callback(accessory, false);
                Ok(Some(false))
            }
            None => Ok(None),
        }
    }

    /// Cancel an in-flight permission request without invoking its
    /// callback, returning the record to the caller.
    pub fn cancel_permission_request(&mut self) -> Option<Accessory> {
        self.armed.take().map(|request| {
            debug!("permission request cancelled");
            request.accessory
        })
    }

    /// Open the accessory device node for reading and writing.
    ///
    /// Requires a granted handle; the transport beyond the returned file
    /// is the application's business.
    pub async fn open(&self, accessory: &Accessory) -> Result<tokio::fs::File, AccessoryError> {
        self.ensure_supported()?;
        if !accessory.permission_granted() {
            return Err(AccessoryError::PermissionDenied);
        }
        tokio::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.config.platform.device_node)
            .await
            .map_err(|e| AccessoryError::OperationFailed(format!(
                "failed to open {}: {e}",
                self.config.platform.device_node
            )))
    }

    // ── Connection callback ───────────────────────────────────────────

    /// Register a connection-changed callback.
    ///
    /// On every status-key change the bridge re-reads the key; a connect
    /// triggers a fresh identity query and hands the callback a borrowed
    /// record, a disconnect hands it `None` without any lookup.
    /// Registering again replaces the previous registration.
    pub fn set_connection_changed_cb<F>(&mut self, callback: F) -> Result<(), AccessoryError>
    where
        F: FnMut(Option<&Accessory>, bool) + Send + 'static,
    {
        self.ensure_supported()?;
        let watch = ConnectionWatch::spawn(&self.status, self.client.clone(), Box::new(callback));
        // Replacing drops (and thereby unsubscribes) any previous watch.
        self.connection_watch = Some(watch);
        Ok(())
    }

    /// Unregister the connection-changed callback, if any.
    pub fn unset_connection_changed_cb(&mut self) {
        self.connection_watch = None;
    }

    /// Whether a connection-changed callback is registered.
    pub fn connection_callback_registered(&self) -> bool {
        self.connection_watch.is_some()
    }
}
