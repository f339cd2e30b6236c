//! smart-alarm daemon - alarm registry, scheduler and socket server
//!
//! This crate provides the core infrastructure for the alarm daemon:
//! - `registry` - Actor owning pending alarms and notices
//! - `scheduler` - Timer tasks, expiration and weekly re-arm
//! - `clock` - Wall-clock source with a sliced `sleep_until`
//! - `notifier` - Queued spoken announcements
//! - `event_log` - Best-effort event log file
//! - `config` - Daemon configuration
//! - `server` - Unix socket server for client connections
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        alarmd daemon                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐    │
//! │  │  DaemonServer   │────▶│      AlarmScheduler         │    │
//! │  │ (Unix Socket)   │     │ (one timer task per alarm)  │    │
//! │  └────────┬────────┘     └──────┬───────────────┬──────┘    │
//! │           │                     │               │           │
//! │           │ events              ▼               ▼           │
//! │  ┌────────┴────────┐     ┌─────────────┐ ┌─────────────┐    │
//! │  │ broadcast::Recv │◀────│RegistryActor│ │  Notifier   │    │
//! │  └─────────────────┘     └─────────────┘ └─────────────┘    │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Production code here does not panic; channel closure is treated as
//! shutdown.

pub mod clock;
pub mod config;
pub mod event_log;
pub mod notifier;
pub mod registry;
pub mod scheduler;
pub mod server;

use std::sync::Arc;

use clock::Clock;
use event_log::EventLog;
use notifier::Notifier;
use scheduler::AlarmScheduler;

/// Spawns a registry and notifier worker and wires a scheduler to them.
pub fn spawn_scheduler(
    notifier: Arc<dyn Notifier>,
    announce_timeout: std::time::Duration,
    event_log: EventLog,
    clock: Arc<dyn Clock>,
) -> AlarmScheduler {
    let registry = registry::spawn_registry();
    let announcer = notifier::spawn_notifier(notifier, announce_timeout);
    AlarmScheduler::new(registry, announcer, event_log, clock)
}
