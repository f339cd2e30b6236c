//! Smart Alarm Core - Shared types for the alarm service
//!
//! This crate provides the domain types shared between
//! the daemon (alarmd) and the command-line client (alarm).
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod alarm;
pub mod error;
pub mod notice;
pub mod schedule;

// Re-exports for convenience
pub use alarm::{display_text, AlarmId, AlarmKey, AlarmSpec, AlarmView};
pub use error::{DomainError, DomainResult};
pub use schedule::{
    next_occurrence, parse_datetime_local, parse_day, parse_schedule, parse_time, repeat_interval,
    to_local, REPEAT_INTERVAL_SECS,
};
