//! Error types for the alarm client.

use std::io;
use thiserror::Error;

/// Client errors.
///
/// Connection errors suggest checking that `alarmd` is running; `Daemon`
/// carries the daemon's own message and error code, which is what the user
/// usually needs to see.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Failed to connect to the daemon.
    #[error("Failed to connect to daemon: {0}")]
    DaemonConnection(String),

    /// Protocol version mismatch with daemon
    #[error("Protocol version mismatch (client: {client_version}, daemon: {daemon_version})")]
    VersionMismatch {
        client_version: String,
        daemon_version: String,
    },

    /// The daemon refused the handshake.
    #[error("Daemon rejected connection: {0}")]
    Rejected(String),

    /// The daemon answered a request with an error.
    #[error("{message}")]
    Daemon {
        message: String,
        code: Option<String>,
    },

    /// The daemon answered with a message that does not fit the request.
    #[error("Unexpected response from daemon: {0}")]
    UnexpectedResponse(String),

    /// No response within the configured timeout.
    #[error("Timed out waiting for daemon")]
    Timeout,

    /// The daemon closed the connection.
    #[error("Daemon closed the connection")]
    Disconnected,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to parse message: {0}")]
    ParseError(#[from] serde_json::Error),
}

impl ClientError {
    /// Error code sent by the daemon, if this is a daemon error.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Daemon { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

/// Convenience Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
