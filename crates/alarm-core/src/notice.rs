//! Texts for notices (the retained notification list) and announcements
//! (spoken messages).
//!
//! Kept in one place so the daemon, its tests and the client agree on the
//! exact wording.

use crate::error::DomainError;

/// Spoken and retained when a cancel request matches no pending alarm.
pub const INVALID_CANCEL: &str = "The alarm you have entered is not valid.";

/// Written to the event log when the notice list is cleared.
pub const NOTICES_CLEARED: &str = "Notifications cleared.";

/// Spoken and retained when the registry cannot take more alarms.
pub const TOO_MANY_ALARMS: &str = "Too many alarms are pending. Cancel one first.";

/// Notice retained when a one-shot alarm fires.
///
/// Built from the display text without its final full stop:
/// `Alarm for X set at HH:MM on YYYY-MM-DD has expired.`
pub fn expired_notice(display_text: &str) -> String {
    let stem = display_text.strip_suffix('.').unwrap_or(display_text);
    format!("{stem} has expired.")
}

/// Spoken when a one-shot alarm fires.
pub fn expired_announcement(description: &str) -> String {
    format!("Alarm for {description} has expired.")
}

/// Spoken and retained when a repeating alarm fires and is re-armed.
pub fn rearmed_notice(description: &str) -> String {
    format!("Alarm for {description} has expired. Alarm set for the same time next week.")
}

/// Notice retained when an alarm is cancelled.
pub fn cancelled_notice(description: &str) -> String {
    format!("{description} has been cancelled.")
}

/// Spoken when an alarm is cancelled.
pub fn cancelled_announcement(description: &str) -> String {
    format!("Alarm for {description} has been cancelled.")
}

/// Spoken and retained when a second alarm with the same description is requested.
pub fn duplicate_notice(description: &str) -> String {
    format!("An alarm for {description} is already set. Cancel it first.")
}

/// Spoken and retained when a create request could not be parsed.
pub fn invalid_request_notice(description: &str, error: &DomainError) -> String {
    let description = description.trim();
    if description.is_empty() {
        format!("The alarm could not be set: {error}.")
    } else {
        format!("Alarm for {description} could not be set: {error}.")
    }
}
