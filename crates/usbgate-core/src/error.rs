//! Error taxonomy for accessory operations.

use crate::ipc::IpcError;

/// Errors returned by [`AccessoryManager`](crate::AccessoryManager)
/// operations.
///
/// Argument and environment problems (`InvalidParameter`, `NotSupported`,
/// `Busy`) are checked before any transport is touched; transport and
/// listener-setup failures arrive wrapped as [`Ipc`](AccessoryError::Ipc).
#[derive(Debug, thiserror::Error)]
pub enum AccessoryError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),

    #[error("accessory support is not available on this platform")]
    NotSupported,

    #[error("a permission request is already in flight")]
    Busy,

    #[error("permission has not been granted for this accessory")]
    PermissionDenied,

    #[error("accessory status unavailable: {0}")]
    OperationFailed(String),

    #[error(transparent)]
    Ipc(#[from] IpcError),
}
