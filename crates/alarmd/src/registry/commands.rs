//! Registry actor commands, errors, and events.
//!
//! This module defines the message types for communicating with the `RegistryActor`:
//! - `AlarmRecord`: a pending alarm together with the token that stops its timer
//! - `RegistryCommand`: Commands sent to the actor
//! - `RegistryError`: Errors that can occur during registry operations
//! - `AlarmEvent`: Events published by the registry for subscribers

use alarm_core::{AlarmId, AlarmKey, AlarmView};
use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Alarm Record
// ============================================================================

/// A pending alarm as the registry stores it.
///
/// The view (display text included) and the timer's cancellation token live
/// in one value, so inserting or removing a record always moves both.
#[derive(Debug, Clone)]
pub struct AlarmRecord {
    pub view: AlarmView,
    pub key: AlarmKey,
    pub handle: CancellationToken,
}

impl AlarmRecord {
    pub fn new(view: AlarmView, handle: CancellationToken) -> Self {
        let key = view.key();
        Self { view, key, handle }
    }

    pub fn id(&self) -> AlarmId {
        self.view.id
    }
}

/// Result of retiring a fired alarm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expiry {
    /// The alarm that fired
    pub fired: AlarmView,
    /// The re-armed occurrence, for repeating alarms
    pub next: Option<AlarmView>,
    /// Notice appended for this expiration
    pub notice: String,
}

/// Consistent copy of the registry state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrySnapshot {
    /// Pending alarms in scheduling order
    pub alarms: Vec<AlarmView>,
    /// Notices, oldest first
    pub notices: Vec<String>,
}

impl RegistrySnapshot {
    /// Display texts of the pending alarms.
    pub fn pending_texts(&self) -> Vec<String> {
        self.alarms.iter().map(|a| a.display_text.clone()).collect()
    }
}

// ============================================================================
// Registry Commands
// ============================================================================

/// Commands sent to the registry actor.
///
/// Each command uses a oneshot channel for the response, enabling
/// request-response patterns in async code without blocking.
#[derive(Debug)]
pub enum RegistryCommand {
    /// Insert a new pending alarm.
    ///
    /// # Errors
    /// - `RegistryError::DuplicateDescription` if an alarm with the same key is pending
    /// - `RegistryError::RegistryFull` if at maximum capacity
    /// - `RegistryError::IdInUse` if the id is already taken
    Register {
        record: Box<AlarmRecord>,
        respond_to: oneshot::Sender<Result<AlarmView, RegistryError>>,
    },

    /// Look up a pending alarm by its exact display text.
    FindByText {
        text: String,
        respond_to: oneshot::Sender<Option<AlarmId>>,
    },

    /// Remove a pending alarm and stop its timer. No notice is written.
    ///
    /// # Errors
    /// - `RegistryError::AlarmNotRegistered` if the id is not pending
    Remove {
        id: AlarmId,
        respond_to: oneshot::Sender<Result<AlarmView, RegistryError>>,
    },

    /// Retire a fired alarm in one step: drop the record, append the
    /// expiration notice and insert the next occurrence if one is given.
    ///
    /// # Errors
    /// - `RegistryError::AlarmNotRegistered` if the alarm was cancelled first
    Expire {
        id: AlarmId,
        rearm: Option<Box<AlarmRecord>>,
        respond_to: oneshot::Sender<Result<Expiry, RegistryError>>,
    },

    /// Cancel by description (canonical key) or exact display text.
    ///
    /// A hit appends the cancellation notice, a miss appends the invalid
    /// notice. A miss on an alarm that has just fired appends nothing.
    ///
    /// # Errors
    /// - `RegistryError::NotFound` if nothing matches
    /// - `RegistryError::AlreadyFired` if the match fired moments ago
    Cancel {
        description: String,
        respond_to: oneshot::Sender<Result<AlarmView, RegistryError>>,
    },

    /// Append a notice. Fire-and-forget.
    AppendNotice { text: String },

    /// Empty the notice list, returning how many were removed.
    ClearNotices { respond_to: oneshot::Sender<usize> },

    /// Copy pending alarms and notices together.
    Snapshot {
        respond_to: oneshot::Sender<RegistrySnapshot>,
    },

    /// Copy pending alarms only.
    GetAlarms {
        respond_to: oneshot::Sender<Vec<AlarmView>>,
    },

    /// Copy notices only.
    GetNotices {
        respond_to: oneshot::Sender<Vec<String>>,
    },
}

// ============================================================================
// Registry Errors
// ============================================================================

/// Errors that can occur during registry operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// No pending alarm matches the description given to cancel.
    #[error("no pending alarm matches '{0}'")]
    NotFound(String),

    /// The alarm being cancelled fired just before the cancel arrived.
    #[error("alarm '{0}' has already fired")]
    AlreadyFired(String),

    /// The id is no longer pending (it fired or was cancelled).
    #[error("alarm {0} is not registered")]
    AlarmNotRegistered(AlarmId),

    /// An alarm with the same description is already pending.
    #[error("an alarm for '{0}' is already pending")]
    DuplicateDescription(String),

    /// The id was already handed out.
    #[error("alarm id {0} is already in use")]
    IdInUse(AlarmId),

    /// The registry has reached its maximum alarm capacity.
    #[error("registry is full (max: {max} alarms)")]
    RegistryFull {
        /// Maximum number of alarms allowed
        max: usize,
    },

    /// The response channel was closed before receiving a response.
    ///
    /// This typically indicates the actor was shut down.
    #[error("response channel closed")]
    ChannelClosed,
}

// ============================================================================
// Alarm Events
// ============================================================================

/// Events published by the registry to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlarmEvent {
    Scheduled {
        alarm: AlarmView,
    },

    /// `next` is set when a repeating alarm was re-armed.
    Fired {
        alarm: AlarmView,
        next: Option<AlarmView>,
    },

    Cancelled {
        alarm: AlarmView,
    },

    NoticeAdded {
        text: String,
    },

    NoticesCleared {
        cleared: usize,
    },
}
