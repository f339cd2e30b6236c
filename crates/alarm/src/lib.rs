//! smart-alarm client library
//!
//! Building blocks for the `alarm` command-line client:
//!
//! - `client` - Request/response connection to the daemon socket
//! - `daemon` - Detecting and starting `alarmd` in the background
//! - `render` - Plain-text rendering of the pending list, notices and events
//!
//! **Panic-Free Policy:** No `.unwrap()`, `.expect()`, `panic!()` outside tests.

pub mod client;
pub mod daemon;
pub mod error;
pub mod render;

pub use client::{AlarmState, ClientConfig, DaemonClient};
pub use error::{ClientError, Result};
