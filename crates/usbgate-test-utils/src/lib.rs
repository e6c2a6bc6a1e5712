#![deny(unsafe_code)]

//! Shared test utilities for the usbgate workspace.
//!
//! Provides a scripted stand-in for the accessory server, helpers that
//! play the server's role on the notification channel, config builders,
//! and tracing setup, so individual crate tests stay concise.
//!
//! Add this crate as a `[dev-dependency]` in any workspace member:
//!
//! ```toml
//! [dev-dependencies]
//! usbgate-test-utils = { workspace = true }
//! ```

pub mod config;
pub mod server;
pub mod tracing_setup;
