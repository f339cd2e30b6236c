//! Alarm scheduler - turns requests into armed timer tasks.
//!
//! Every pending alarm has exactly one timer task, spawned on a
//! `TaskTracker`. The task waits for either its cancellation token or the
//! fire time, then asks the registry to retire the alarm. Whoever reaches the
//! registry first (timer or cancel request) wins; the loser changes nothing.
//!
//! A repeating alarm is re-armed by inserting a fresh record (new id, same
//! description, one week later) in the same registry step that retires the
//! old one, then spawning a new task for it. Timer tasks never nest.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()` in production code
//! - Registry races surface as `AlarmNotRegistered` and are logged at debug

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Local};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use alarm_core::notice;
use alarm_core::{next_occurrence, AlarmId, AlarmSpec, AlarmView, DomainError, DomainResult};
use alarm_protocol::error_code;

use crate::clock::Clock;
use crate::event_log::EventLog;
use crate::notifier::NotifierHandle;
use crate::registry::{AlarmEvent, AlarmRecord, RegistryError, RegistryHandle, RegistrySnapshot};

// ============================================================================
// Errors
// ============================================================================

/// Errors returned to request handlers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    InvalidRequest(#[from] DomainError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl SchedulerError {
    /// Stable protocol error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => error_code::INVALID_SCHEDULE,
            Self::Registry(RegistryError::NotFound(_) | RegistryError::AlreadyFired(_)) => {
                error_code::NOT_FOUND
            }
            Self::Registry(RegistryError::DuplicateDescription(_)) => error_code::DUPLICATE,
            Self::Registry(RegistryError::RegistryFull { .. }) => error_code::REGISTRY_FULL,
            Self::Registry(_) => error_code::INTERNAL,
        }
    }
}

// ============================================================================
// Scheduler
// ============================================================================

/// Cheap-to-clone front door to alarm scheduling.
#[derive(Debug, Clone)]
pub struct AlarmScheduler {
    registry: RegistryHandle,
    notifier: NotifierHandle,
    event_log: EventLog,
    clock: Arc<dyn Clock>,
    next_id: Arc<AtomicU64>,
    tracker: TaskTracker,
    /// Parent of every timer token
    shutdown: CancellationToken,
}

impl AlarmScheduler {
    pub fn new(
        registry: RegistryHandle,
        notifier: NotifierHandle,
        event_log: EventLog,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            notifier,
            event_log,
            clock,
            next_id: Arc::new(AtomicU64::new(1)),
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    // ========================================================================
    // Requests
    // ========================================================================

    /// Parses `day` (`YYYY-MM-DD`) and `time` (`HH:MM`) and schedules the alarm.
    ///
    /// # Errors
    /// - `SchedulerError::InvalidRequest` for malformed input (also noticed and announced)
    /// - `SchedulerError::Registry` if the registry rejects the alarm
    pub async fn create_alarm(
        &self,
        description: &str,
        day: &str,
        time: &str,
        repeat: bool,
    ) -> Result<AlarmView, SchedulerError> {
        self.submit(description, AlarmSpec::parse(description, day, time, repeat))
            .await
    }

    /// Schedules an already-parsed request, reporting parse failures to the user.
    ///
    /// # Errors
    /// Same as [`AlarmScheduler::create_alarm`].
    pub async fn submit(
        &self,
        description: &str,
        spec: DomainResult<AlarmSpec>,
    ) -> Result<AlarmView, SchedulerError> {
        match spec {
            Ok(spec) => self.schedule(spec).await,
            Err(e) => {
                warn!(description = %description, error = %e, "Rejected alarm request");
                self.report(notice::invalid_request_notice(description, &e))
                    .await;
                Err(e.into())
            }
        }
    }

    /// Registers and arms a validated alarm.
    ///
    /// The creation is announced before the timer is armed; a `fire_at` in
    /// the past therefore fires right after the announcement.
    ///
    /// # Errors
    /// - `SchedulerError::Registry` with `DuplicateDescription` or `RegistryFull`
    pub async fn schedule(&self, spec: AlarmSpec) -> Result<AlarmView, SchedulerError> {
        let record = self.new_record(&spec.description, spec.fire_at, spec.repeat, 1);
        let token = record.handle.clone();

        let view = match self.registry.register(record).await {
            Ok(view) => view,
            Err(e) => {
                match &e {
                    RegistryError::DuplicateDescription(_) => {
                        self.report(notice::duplicate_notice(&spec.description)).await;
                    }
                    RegistryError::RegistryFull { .. } => {
                        self.report(notice::TOO_MANY_ALARMS.to_string()).await;
                    }
                    _ => warn!(error = %e, "Alarm registration failed"),
                }
                return Err(e.into());
            }
        };

        self.notifier.announce_and_wait(view.display_text.clone()).await;
        self.event_log.log_event(&view.display_text);
        self.arm(view.clone(), token);

        Ok(view)
    }

    /// Cancels a pending alarm by description (or its full display text).
    ///
    /// # Errors
    /// - `SchedulerError::Registry(NotFound)` if nothing matched; the invalid
    ///   notice has been appended and is announced
    /// - `SchedulerError::Registry(AlreadyFired)` if the alarm fired moments
    ///   ago; nothing is appended or announced
    pub async fn cancel(&self, description: &str) -> Result<AlarmView, SchedulerError> {
        match self.registry.cancel(description).await {
            Ok(view) => {
                self.notifier
                    .announce_and_wait(notice::cancelled_announcement(&view.description))
                    .await;
                self.event_log
                    .log_event(&notice::cancelled_notice(&view.description));
                Ok(view)
            }
            Err(e) => {
                if matches!(e, RegistryError::NotFound(_)) {
                    self.notifier.announce(notice::INVALID_CANCEL);
                }
                Err(e.into())
            }
        }
    }

    /// Empties the notice list. Pending alarms are untouched.
    ///
    /// # Errors
    /// - `SchedulerError::Registry(ChannelClosed)` if the registry is gone
    pub async fn clear_notices(&self) -> Result<usize, SchedulerError> {
        let cleared = self.registry.clear_notices().await?;
        self.event_log.log_event(notice::NOTICES_CLEARED);
        Ok(cleared)
    }

    pub async fn list_pending(&self) -> Vec<String> {
        self.registry.list_pending().await
    }

    pub async fn list_notices(&self) -> Vec<String> {
        self.registry.list_notices().await
    }

    pub async fn snapshot(&self) -> RegistrySnapshot {
        self.registry.snapshot().await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AlarmEvent> {
        self.registry.subscribe()
    }

    /// Number of timer tasks that have not finished yet.
    pub fn live_timers(&self) -> usize {
        self.tracker.len()
    }

    /// Stops every timer and waits for the tasks to exit.
    pub async fn shutdown(&self) {
        info!(live_timers = self.tracker.len(), "Stopping alarm timers");
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }

    // ========================================================================
    // Timers
    // ========================================================================

    fn new_record(
        &self,
        description: &str,
        fire_at: DateTime<Local>,
        repeat: bool,
        occurrence: u32,
    ) -> AlarmRecord {
        let id = AlarmId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let view = AlarmView::new(id, description, fire_at, repeat, occurrence);
        AlarmRecord::new(view, self.shutdown.child_token())
    }

    fn arm(&self, view: AlarmView, token: CancellationToken) {
        let scheduler = self.clone();
        self.tracker.spawn(async move {
            scheduler.run_timer(view, token).await;
        });
    }

    async fn run_timer(&self, view: AlarmView, token: CancellationToken) {
        debug!(alarm_id = %view.id, fire_at = %view.fire_at, "Timer armed");

        tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(alarm_id = %view.id, "Timer cancelled");
                return;
            }
            _ = self.clock.sleep_until(view.fire_at) => {}
        }

        if view.repeat {
            self.expire_and_rearm(view).await;
        } else {
            self.expire_one_shot(view).await;
        }
    }

    async fn expire_one_shot(&self, view: AlarmView) {
        match self.registry.expire(view.id, None).await {
            Ok(expiry) => {
                info!(alarm_id = %view.id, "Alarm fired");
                self.notifier
                    .announce(notice::expired_announcement(&view.description));
                self.event_log.log_event(&expiry.notice);
            }
            Err(RegistryError::AlarmNotRegistered(id)) => {
                debug!(alarm_id = %id, "Alarm was cancelled before it fired");
            }
            Err(e) => warn!(alarm_id = %view.id, error = %e, "Failed to expire alarm"),
        }
    }

    async fn expire_and_rearm(&self, view: AlarmView) {
        let next_at = next_occurrence(view.fire_at, self.clock.now());
        let record = self.new_record(
            &view.description,
            next_at,
            true,
            view.occurrence.saturating_add(1),
        );
        let token = record.handle.clone();

        match self.registry.expire(view.id, Some(record)).await {
            Ok(expiry) => {
                info!(alarm_id = %view.id, next_fire_at = %next_at, "Repeating alarm fired");
                self.notifier.announce(expiry.notice.clone());
                self.event_log.log_event(&expiry.notice);
                if let Some(next) = expiry.next {
                    self.arm(next, token);
                }
            }
            Err(RegistryError::AlarmNotRegistered(id)) => {
                debug!(alarm_id = %id, "Repeating alarm was cancelled before it fired");
            }
            Err(e) => warn!(alarm_id = %view.id, error = %e, "Failed to re-arm alarm"),
        }
    }

    /// Appends a notice and speaks it.
    async fn report(&self, text: String) {
        self.registry.append_notice(text.clone()).await;
        self.notifier.announce(text);
    }
}
