//! Registry actor - owns all alarm state and processes commands.
//!
//! The RegistryActor is the single owner of pending alarms and notices.
//! It receives commands via an mpsc channel and publishes events via broadcast.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use alarm_core::notice;
use alarm_core::{AlarmId, AlarmKey, AlarmView};

use super::commands::{AlarmEvent, AlarmRecord, Expiry, RegistryCommand, RegistryError, RegistrySnapshot};

// ============================================================================
// Resource Limits
// ============================================================================

/// Maximum number of pending alarms the registry can hold.
pub const MAX_ALARMS: usize = 100;

/// Maximum number of retained notices. The oldest are dropped first.
pub const MAX_NOTICES: usize = 200;

/// A cancel this soon after its alarm fired lost the race and stays quiet.
pub const RECENTLY_FIRED: Duration = Duration::from_secs(5);

// ============================================================================
// Registry Actor
// ============================================================================

/// The registry actor - owns all alarm state.
///
/// # Ownership
///
/// The actor owns:
/// - `alarms`: pending records ordered by id, which is scheduling order
/// - `by_key`: index for description key → id lookups
/// - `notices`: the retained notice list
/// - `fired`: alarms that fired within [`RECENTLY_FIRED`], oldest first
///
/// All state mutations happen within this single task, so a fire and a
/// cancel for the same alarm are ordered by whichever command arrives first.
pub struct RegistryActor {
    /// Command receiver
    receiver: mpsc::Receiver<RegistryCommand>,

    alarms: BTreeMap<AlarmId, AlarmRecord>,

    by_key: HashMap<AlarmKey, AlarmId>,

    notices: VecDeque<String>,

    fired: VecDeque<FiredAlarm>,

    /// Event publisher for subscribed clients
    event_publisher: broadcast::Sender<AlarmEvent>,
}

impl RegistryActor {
    /// Creates a new registry actor.
    pub fn new(
        receiver: mpsc::Receiver<RegistryCommand>,
        event_publisher: broadcast::Sender<AlarmEvent>,
    ) -> Self {
        Self {
            receiver,
            alarms: BTreeMap::new(),
            by_key: HashMap::new(),
            notices: VecDeque::new(),
            fired: VecDeque::new(),
            event_publisher,
        }
    }

    /// Runs the actor event loop.
    ///
    /// Processes commands until the channel closes (all senders dropped).
    /// Timers still pending at that point are cancelled.
    pub async fn run(mut self) {
        info!("Registry actor starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        for record in self.alarms.values() {
            record.handle.cancel();
        }

        info!(
            alarms = self.alarms.len(),
            notices = self.notices.len(),
            "Registry actor stopped"
        );
    }

    /// Dispatches a command to the appropriate handler.
    fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::Register { record, respond_to } => {
                let result = self.handle_register(*record);
                // Ignore send error - client may have dropped the receiver
                let _ = respond_to.send(result);
            }
            RegistryCommand::FindByText { text, respond_to } => {
                let _ = respond_to.send(self.handle_find_by_text(&text));
            }
            RegistryCommand::Remove { id, respond_to } => {
                let _ = respond_to.send(self.handle_remove(id));
            }
            RegistryCommand::Expire {
                id,
                rearm,
                respond_to,
            } => {
                let result = self.handle_expire(id, rearm.map(|r| *r));
                let _ = respond_to.send(result);
            }
            RegistryCommand::Cancel {
                description,
                respond_to,
            } => {
                let _ = respond_to.send(self.handle_cancel(&description));
            }
            RegistryCommand::AppendNotice { text } => {
                self.push_notice(text);
            }
            RegistryCommand::ClearNotices { respond_to } => {
                let _ = respond_to.send(self.handle_clear_notices());
            }
            RegistryCommand::Snapshot { respond_to } => {
                let _ = respond_to.send(RegistrySnapshot {
                    alarms: self.views(),
                    notices: self.notices.iter().cloned().collect(),
                });
            }
            RegistryCommand::GetAlarms { respond_to } => {
                let _ = respond_to.send(self.views());
            }
            RegistryCommand::GetNotices { respond_to } => {
                let _ = respond_to.send(self.notices.iter().cloned().collect());
            }
        }
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    fn handle_register(&mut self, record: AlarmRecord) -> Result<AlarmView, RegistryError> {
        if self.by_key.contains_key(&record.key) {
            debug!(alarm_id = %record.id(), key = %record.key, "Duplicate description rejected");
            return Err(RegistryError::DuplicateDescription(record.view.description));
        }

        if self.alarms.contains_key(&record.id()) {
            warn!(alarm_id = %record.id(), "Alarm id reused, rejecting registration");
            return Err(RegistryError::IdInUse(record.id()));
        }

        if self.alarms.len() >= MAX_ALARMS {
            warn!(
                alarm_id = %record.id(),
                current = self.alarms.len(),
                max = MAX_ALARMS,
                "Registry is full, rejecting registration"
            );
            return Err(RegistryError::RegistryFull { max: MAX_ALARMS });
        }

        let view = self.insert(record);

        info!(
            alarm_id = %view.id,
            fire_at = %view.fire_at,
            repeat = view.repeat,
            pending = self.alarms.len(),
            "Alarm registered"
        );

        let _ = self.event_publisher.send(AlarmEvent::Scheduled {
            alarm: view.clone(),
        });

        Ok(view)
    }

    fn handle_find_by_text(&self, text: &str) -> Option<AlarmId> {
        self.alarms
            .values()
            .find(|record| record.view.display_text == text)
            .map(AlarmRecord::id)
    }

    fn handle_remove(&mut self, id: AlarmId) -> Result<AlarmView, RegistryError> {
        let record = self.take(id).ok_or(RegistryError::AlarmNotRegistered(id))?;
        record.handle.cancel();

        info!(alarm_id = %id, pending = self.alarms.len(), "Alarm removed");

        Ok(record.view)
    }

    fn handle_expire(
        &mut self,
        id: AlarmId,
        rearm: Option<AlarmRecord>,
    ) -> Result<Expiry, RegistryError> {
        let Some(fired) = self.take(id) else {
            debug!(alarm_id = %id, "Expired alarm no longer registered");
            return Err(RegistryError::AlarmNotRegistered(id));
        };

        let fired = fired.view;
        self.remember_fired(&fired);
        let next = rearm.map(|record| self.insert(record));

        let notice = match &next {
            Some(_) => notice::rearmed_notice(&fired.description),
            None => notice::expired_notice(&fired.display_text),
        };

        info!(
            alarm_id = %id,
            next_id = next.as_ref().map(|n| n.id.as_u64()),
            pending = self.alarms.len(),
            "Alarm expired"
        );

        let _ = self.event_publisher.send(AlarmEvent::Fired {
            alarm: fired.clone(),
            next: next.clone(),
        });
        self.push_notice(notice.clone());

        Ok(Expiry {
            fired,
            next,
            notice,
        })
    }

    fn handle_cancel(&mut self, description: &str) -> Result<AlarmView, RegistryError> {
        let key = AlarmKey::from_description(description);
        let id = self
            .by_key
            .get(&key)
            .copied()
            .or_else(|| self.handle_find_by_text(description.trim()));

        let Some(record) = id.and_then(|id| self.take(id)) else {
            if self.fired_recently(&key, description.trim()) {
                info!(description = %description, "Cancel arrived after the alarm fired");
                return Err(RegistryError::AlreadyFired(description.to_string()));
            }
            info!(description = %description, "Cancel matched no pending alarm");
            self.push_notice(notice::INVALID_CANCEL.to_string());
            return Err(RegistryError::NotFound(description.to_string()));
        };

        record.handle.cancel();
        let view = record.view;

        info!(alarm_id = %view.id, pending = self.alarms.len(), "Alarm cancelled");

        let _ = self.event_publisher.send(AlarmEvent::Cancelled {
            alarm: view.clone(),
        });
        self.push_notice(notice::cancelled_notice(&view.description));

        Ok(view)
    }

    fn handle_clear_notices(&mut self) -> usize {
        let cleared = self.notices.len();
        self.notices.clear();

        debug!(cleared, "Notices cleared");
        let _ = self
            .event_publisher
            .send(AlarmEvent::NoticesCleared { cleared });

        cleared
    }

    // ========================================================================
    // State Helpers
    // ========================================================================

    fn insert(&mut self, record: AlarmRecord) -> AlarmView {
        let view = record.view.clone();
        self.by_key.insert(record.key.clone(), record.id());
        self.alarms.insert(record.id(), record);
        view
    }

    fn take(&mut self, id: AlarmId) -> Option<AlarmRecord> {
        let record = self.alarms.remove(&id)?;
        if self.by_key.get(&record.key) == Some(&id) {
            self.by_key.remove(&record.key);
        }
        Some(record)
    }

    fn push_notice(&mut self, text: String) {
        while self.notices.len() >= MAX_NOTICES {
            self.notices.pop_front();
        }
        self.notices.push_back(text.clone());
        let _ = self.event_publisher.send(AlarmEvent::NoticeAdded { text });
    }

    fn remember_fired(&mut self, view: &AlarmView) {
        self.forget_stale_fired();
        if self.fired.len() >= MAX_ALARMS {
            self.fired.pop_front();
        }
        self.fired.push_back(FiredAlarm {
            key: view.key(),
            display_text: view.display_text.clone(),
            at: Instant::now(),
        });
    }

    fn fired_recently(&mut self, key: &AlarmKey, text: &str) -> bool {
        self.forget_stale_fired();
        self.fired
            .iter()
            .any(|f| &f.key == key || f.display_text == text)
    }

    fn forget_stale_fired(&mut self) {
        while self
            .fired
            .front()
            .is_some_and(|f| f.at.elapsed() > RECENTLY_FIRED)
        {
            self.fired.pop_front();
        }
    }

    fn views(&self) -> Vec<AlarmView> {
        self.alarms.values().map(|r| r.view.clone()).collect()
    }

    // ========================================================================
    // Accessors (for testing)
    // ========================================================================

    #[cfg(test)]
    pub fn alarm_count(&self) -> usize {
        self.alarms.len()
    }

    #[cfg(test)]
    pub fn notice_count(&self) -> usize {
        self.notices.len()
    }
}

#[derive(Debug)]
struct FiredAlarm {
    key: AlarmKey,
    display_text: String,
    at: Instant,
}
