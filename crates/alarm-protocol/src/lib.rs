//! Smart Alarm Protocol - Wire protocol for daemon communication
//!
//! This crate provides message types and parsing for communication
//! between the `alarm` client (or any other front end) and the daemon.
//! Messages are newline-delimited JSON objects tagged by `type`.

pub mod message;
pub mod parse;
pub mod version;

pub use message::{error_code, ClientMessage, DaemonMessage, MessageType};
pub use parse::RawAlarmRequest;
pub use version::{ProtocolVersion, VersionError};
