//! Cloneable front end of the registry actor.
//!
//! The `RegistryHandle` is a cheap-to-clone interface for sending commands
//! to the registry actor and subscribing to alarm events. Channel errors are
//! mapped to `RegistryError::ChannelClosed`; read-only queries degrade to
//! empty results instead.

use tokio::sync::{broadcast, mpsc, oneshot};

use alarm_core::{AlarmId, AlarmView};

use super::commands::{
    AlarmEvent, AlarmRecord, Expiry, RegistryCommand, RegistryError, RegistrySnapshot,
};

// ============================================================================
// Registry Handle
// ============================================================================

/// Sends commands to the registry actor and hands out event receivers.
#[derive(Debug, Clone)]
pub struct RegistryHandle {
    /// Command sender to the actor
    sender: mpsc::Sender<RegistryCommand>,

    /// Event broadcaster for subscribing to updates
    event_sender: broadcast::Sender<AlarmEvent>,
}

impl RegistryHandle {
    pub fn new(
        sender: mpsc::Sender<RegistryCommand>,
        event_sender: broadcast::Sender<AlarmEvent>,
    ) -> Self {
        Self {
            sender,
            event_sender,
        }
    }

    /// Sends a command built around a fresh oneshot and waits for the reply.
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> RegistryCommand,
    ) -> Option<T> {
        let (tx, rx) = oneshot::channel();
        self.sender.send(build(tx)).await.ok()?;
        rx.await.ok()
    }

    /// Register a new pending alarm.
    ///
    /// # Errors
    ///
    /// - `RegistryError::DuplicateDescription` if the description is already pending
    /// - `RegistryError::RegistryFull` if the registry is at maximum capacity
    /// - `RegistryError::ChannelClosed` once the registry has stopped
    pub async fn register(&self, record: AlarmRecord) -> Result<AlarmView, RegistryError> {
        self.request(|respond_to| RegistryCommand::Register {
            record: Box::new(record),
            respond_to,
        })
        .await
        .ok_or(RegistryError::ChannelClosed)?
    }

    /// Find a pending alarm by its exact display text.
    pub async fn find_by_text(&self, text: &str) -> Option<AlarmId> {
        self.request(|respond_to| RegistryCommand::FindByText {
            text: text.to_string(),
            respond_to,
        })
        .await
        .flatten()
    }

    /// Remove a pending alarm and stop its timer.
    ///
    /// # Errors
    ///
    /// - `RegistryError::AlarmNotRegistered` if the id is not pending
    /// - `RegistryError::ChannelClosed` once the registry has stopped
    pub async fn remove(&self, id: AlarmId) -> Result<AlarmView, RegistryError> {
        self.request(|respond_to| RegistryCommand::Remove { id, respond_to })
            .await
            .ok_or(RegistryError::ChannelClosed)?
    }

    /// Retire a fired alarm, inserting `rearm` as its next occurrence.
    ///
    /// # Errors
    ///
    /// - `RegistryError::AlarmNotRegistered` if the alarm was cancelled first
    /// - `RegistryError::ChannelClosed` once the registry has stopped
    pub async fn expire(
        &self,
        id: AlarmId,
        rearm: Option<AlarmRecord>,
    ) -> Result<Expiry, RegistryError> {
        self.request(|respond_to| RegistryCommand::Expire {
            id,
            rearm: rearm.map(Box::new),
            respond_to,
        })
        .await
        .ok_or(RegistryError::ChannelClosed)?
    }

    /// Cancel a pending alarm by description or display text.
    ///
    /// # Errors
    ///
    /// - `RegistryError::NotFound` if nothing matches (an invalid notice is appended)
    /// - `RegistryError::AlreadyFired` if the alarm fired moments ago (no notice)
    /// - `RegistryError::ChannelClosed` once the registry has stopped
    pub async fn cancel(&self, description: &str) -> Result<AlarmView, RegistryError> {
        self.request(|respond_to| RegistryCommand::Cancel {
            description: description.to_string(),
            respond_to,
        })
        .await
        .ok_or(RegistryError::ChannelClosed)?
    }

    /// Append a notice.
    ///
    /// This is a fire-and-forget operation.
    pub async fn append_notice(&self, text: impl Into<String>) {
        // Ignore send errors (actor may be shutting down)
        let _ = self
            .sender
            .send(RegistryCommand::AppendNotice { text: text.into() })
            .await;
    }

    /// Empty the notice list, returning how many notices were removed.
    ///
    /// # Errors
    ///
    /// - `RegistryError::ChannelClosed` once the registry has stopped
    pub async fn clear_notices(&self) -> Result<usize, RegistryError> {
        self.request(|respond_to| RegistryCommand::ClearNotices { respond_to })
            .await
            .ok_or(RegistryError::ChannelClosed)
    }

    /// Copy pending alarms and notices in one step.
    ///
    /// Returns an empty snapshot if communication with the actor fails.
    pub async fn snapshot(&self) -> RegistrySnapshot {
        self.request(|respond_to| RegistryCommand::Snapshot { respond_to })
            .await
            .unwrap_or_default()
    }

    /// Pending alarms, in scheduling order.
    pub async fn get_alarms(&self) -> Vec<AlarmView> {
        self.request(|respond_to| RegistryCommand::GetAlarms { respond_to })
            .await
            .unwrap_or_default()
    }

    /// Display texts of the pending alarms.
    pub async fn list_pending(&self) -> Vec<String> {
        self.get_alarms()
            .await
            .into_iter()
            .map(|alarm| alarm.display_text)
            .collect()
    }

    /// Retained notices, oldest first.
    pub async fn list_notices(&self) -> Vec<String> {
        self.request(|respond_to| RegistryCommand::GetNotices { respond_to })
            .await
            .unwrap_or_default()
    }

    /// Subscribe to alarm events.
    ///
    /// Does not round-trip through the actor.
    pub fn subscribe(&self) -> broadcast::Receiver<AlarmEvent> {
        self.event_sender.subscribe()
    }

    /// Returns `true` if the command channel is still open.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }
}
