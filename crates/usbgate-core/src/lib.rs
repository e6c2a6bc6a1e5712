#![deny(unsafe_code)]

//! Client library for the platform's USB accessory server.
//!
//! Applications use this crate to discover the attached USB accessory,
//! check and request host-granted permission to talk to it, and follow
//! connection-state changes. The privileged accessory server answers
//! queries synchronously over its request socket and pushes asynchronous
//! permission decisions back over a notification socket owned by this
//! library; [`AccessoryManager`] wraps both channels behind one session
//! object.

/// Accessory record model and list traversal.
pub mod accessory;
/// Error taxonomy for accessory operations.
pub mod error;
/// Application identity presented to the server.
pub mod identity;
/// Wire codec, request client, and notification listener.
pub mod ipc;
/// Session object owning the permission and connection registrations.
pub mod session;
/// Connection-status key and bridge.
pub mod status;

pub use accessory::{Accessory, AccessoryList};
pub use error::AccessoryError;
pub use session::AccessoryManager;
pub use status::{StatusKey, STATUS_CONNECTED, STATUS_DISCONNECTED};
