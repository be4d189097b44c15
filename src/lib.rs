//! Library interface for usbnet.
//!
//! Everything that does not touch hardware lives here so it can be tested
//! on the host (no embedded hardware required):
//!
//! - [`bridge`] - the USB-to-IP network bridge (queues, link state,
//!   registry, pump, events)
//! - [`config`] - constants and the start-up capability record
//! - [`error`] - the bridge error taxonomy
//! - [`status`] - the HTTP status page served on the device address
//!
//! Usage: `cargo test`
//!
//! Note: The embedded binary (main.rs, `--features embedded`) links this
//! library and adds the USB device, IP stack and diagnostics tasks.

#![cfg_attr(not(test), no_std)]

// This must go first so the logging macros are visible to every module.
mod fmt;

pub mod bridge;
pub mod config;
pub mod error;
pub mod status;

pub use error::BridgeError;
