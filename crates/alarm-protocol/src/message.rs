//! Requests and replies exchanged between `alarm` clients and `alarmd`.

use crate::parse::RawAlarmRequest;
use crate::version::ProtocolVersion;
use alarm_core::AlarmView;
use serde::{Deserialize, Serialize};

/// Stable error codes carried by `DaemonMessage::Error`.
pub mod error_code {
    /// Day/time could not be parsed or the description was blank
    pub const INVALID_SCHEDULE: &str = "invalid_schedule";
    /// Cancel target is not pending
    pub const NOT_FOUND: &str = "not_found";
    /// An alarm with the same description is already pending
    pub const DUPLICATE: &str = "duplicate";
    /// Too many pending alarms
    pub const REGISTRY_FULL: &str = "registry_full";
    /// Malformed or out-of-sequence message
    pub const PROTOCOL: &str = "protocol";
    /// The daemon could not complete the request
    pub const INTERNAL: &str = "internal";
}

/// What a client asks the daemon to do.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageType {
    /// First message on every connection
    Connect {
        /// Requested id; the daemon assigns one when absent
        #[serde(skip_serializing_if = "Option::is_none")]
        client_id: Option<String>,
    },

    /// Schedule a new alarm
    CreateAlarm {
        /// The raw request (validated by the daemon)
        request: RawAlarmRequest,
    },

    /// Cancel a pending alarm by description (or full display text)
    CancelAlarm { description: String },

    /// Empty the notice list
    ClearNotices,

    /// Request pending alarms and notices
    ListAlarms,

    /// Subscribe to alarm events
    Subscribe,

    /// Unsubscribe from events
    Unsubscribe,

    /// Liveness probe
    Ping {
        /// Echoed back in the pong
        seq: u64,
    },

    /// Polite close; the daemon does not reply
    Disconnect,
}

/// One request line: a body stamped with the sender's protocol version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientMessage {
    /// Protocol version
    pub protocol_version: ProtocolVersion,

    /// Message payload
    #[serde(flatten)]
    pub message: MessageType,
}

impl ClientMessage {
    /// Stamps `message` with [`ProtocolVersion::CURRENT`].
    pub fn new(message: MessageType) -> Self {
        Self {
            protocol_version: ProtocolVersion::CURRENT,
            message,
        }
    }

    pub fn connect(client_id: Option<String>) -> Self {
        Self::new(MessageType::Connect { client_id })
    }

    pub fn create_alarm(request: RawAlarmRequest) -> Self {
        Self::new(MessageType::CreateAlarm { request })
    }

    pub fn cancel_alarm(description: impl Into<String>) -> Self {
        Self::new(MessageType::CancelAlarm {
            description: description.into(),
        })
    }

    pub fn clear_notices() -> Self {
        Self::new(MessageType::ClearNotices)
    }

    pub fn list_alarms() -> Self {
        Self::new(MessageType::ListAlarms)
    }

    pub fn subscribe() -> Self {
        Self::new(MessageType::Subscribe)
    }

    pub fn ping(seq: u64) -> Self {
        Self::new(MessageType::Ping { seq })
    }

    pub fn disconnect() -> Self {
        Self::new(MessageType::Disconnect)
    }
}

/// Everything the daemon writes to a client.
///
/// `AlarmScheduled`, `AlarmCancelled` and `NoticesCleared` double as direct
/// replies and as broadcasts to subscribers; `AlarmFired` and `NoticeAdded`
/// are only broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DaemonMessage {
    /// Connection accepted
    Connected {
        /// Version the daemon speaks
        protocol_version: ProtocolVersion,
        /// Assigned client ID
        client_id: String,
    },

    /// Handshake refused, usually an incompatible major version
    Rejected {
        /// Reason for rejection
        reason: String,
        /// Version the daemon speaks
        protocol_version: ProtocolVersion,
    },

    /// Pending alarms and notices, in display order
    AlarmList {
        alarms: Vec<AlarmView>,
        notices: Vec<String>,
    },

    /// An alarm was scheduled
    AlarmScheduled { alarm: AlarmView },

    /// An alarm was cancelled before firing
    AlarmCancelled { alarm: AlarmView },

    /// An alarm fired; `next` is the re-armed occurrence of a repeating alarm
    AlarmFired {
        alarm: AlarmView,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        next: Option<AlarmView>,
    },

    /// A notice was appended
    NoticeAdded { text: String },

    /// The notice list was emptied
    NoticesCleared { cleared: usize },

    /// Pong response to ping
    Pong {
        /// Copied from the ping
        seq: u64,
    },

    /// Error response
    Error {
        /// Error message
        message: String,
        /// Error code (see [`error_code`])
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

impl DaemonMessage {
    pub fn connected(client_id: String) -> Self {
        Self::Connected {
            protocol_version: ProtocolVersion::CURRENT,
            client_id,
        }
    }

    pub fn rejected(reason: &str) -> Self {
        Self::Rejected {
            reason: reason.to_string(),
            protocol_version: ProtocolVersion::CURRENT,
        }
    }

    pub fn alarm_list(alarms: Vec<AlarmView>, notices: Vec<String>) -> Self {
        Self::AlarmList { alarms, notices }
    }

    pub fn alarm_scheduled(alarm: AlarmView) -> Self {
        Self::AlarmScheduled { alarm }
    }

    pub fn alarm_cancelled(alarm: AlarmView) -> Self {
        Self::AlarmCancelled { alarm }
    }

    pub fn alarm_fired(alarm: AlarmView, next: Option<AlarmView>) -> Self {
        Self::AlarmFired { alarm, next }
    }

    pub fn notice_added(text: impl Into<String>) -> Self {
        Self::NoticeAdded { text: text.into() }
    }

    pub fn notices_cleared(cleared: usize) -> Self {
        Self::NoticesCleared { cleared }
    }

    pub fn pong(seq: u64) -> Self {
        Self::Pong { seq }
    }

    pub fn error(message: &str) -> Self {
        Self::Error {
            message: message.to_string(),
            code: None,
        }
    }

    pub fn error_with_code(message: &str, code: &str) -> Self {
        Self::Error {
            message: message.to_string(),
            code: Some(code.to_string()),
        }
    }
}
