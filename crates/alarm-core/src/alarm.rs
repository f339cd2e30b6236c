//! Alarm domain entities and value objects.

use chrono::{DateTime, Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{DomainError, DomainResult};
use crate::schedule;

// ============================================================================
// Type-Safe Identifiers
// ============================================================================

/// Stable identifier for one scheduled alarm instance.
///
/// Assigned by the scheduler, monotonically increasing. A repeating alarm
/// gets a fresh id for every occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlarmId(u64);

impl AlarmId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for AlarmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Canonical identity of an alarm, derived from its description.
///
/// Whitespace is trimmed and collapsed and the text is lower-cased, so
/// "Morning  Run" and "morning run" name the same alarm. The same key is
/// used when registering and when cancelling.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AlarmKey(String);

impl AlarmKey {
    pub fn from_description(description: &str) -> Self {
        let collapsed = description.split_whitespace().collect::<Vec<_>>().join(" ");
        Self(collapsed.to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the description normalizes to nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for AlarmKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Display Text
// ============================================================================

/// Builds the human-readable summary shown in the pending list.
///
/// `Alarm for {description} set at HH:MM on YYYY-MM-DD.` for one-shot
/// alarms, `... on YYYY-MM-DD every week.` for repeating ones.
pub fn display_text(description: &str, fire_at: &DateTime<Local>, repeat: bool) -> String {
    let suffix = if repeat { " every week." } else { "." };
    format!(
        "Alarm for {description} set at {} on {}{suffix}",
        fire_at.format(schedule::TIME_FORMAT),
        fire_at.format(schedule::DAY_FORMAT),
    )
}

// ============================================================================
// Alarm Spec
// ============================================================================

/// A validated request to schedule an alarm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmSpec {
    pub description: String,
    pub fire_at: DateTime<Local>,
    pub repeat: bool,
}

impl AlarmSpec {
    /// Creates a spec, trimming the description.
    ///
    /// # Errors
    /// - `DomainError::EmptyDescription` if the description is blank
    pub fn new(description: &str, fire_at: DateTime<Local>, repeat: bool) -> DomainResult<Self> {
        let description = description.trim();
        if description.is_empty() {
            return Err(DomainError::EmptyDescription);
        }
        Ok(Self {
            description: description.to_string(),
            fire_at,
            repeat,
        })
    }

    /// Creates a spec from a naive local timestamp.
    pub fn from_naive(description: &str, naive: NaiveDateTime, repeat: bool) -> DomainResult<Self> {
        Self::new(description, schedule::to_local(naive)?, repeat)
    }

    /// Creates a spec from the `YYYY-MM-DD` / `HH:MM` strings a user typed.
    pub fn parse(description: &str, day: &str, time: &str, repeat: bool) -> DomainResult<Self> {
        Self::from_naive(description, schedule::parse_schedule(day, time)?, repeat)
    }

    pub fn key(&self) -> AlarmKey {
        AlarmKey::from_description(&self.description)
    }

    pub fn display_text(&self) -> String {
        display_text(&self.description, &self.fire_at, self.repeat)
    }
}

// ============================================================================
// Alarm View
// ============================================================================

/// Read-only snapshot of a pending alarm.
///
/// This is what the registry hands out for rendering and what travels over
/// the wire to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmView {
    pub id: AlarmId,
    pub description: String,
    pub display_text: String,
    pub fire_at: DateTime<Local>,
    pub repeat: bool,
    /// 1 for a newly created alarm, incremented on every weekly re-arm
    pub occurrence: u32,
}

impl AlarmView {
    /// Builds a view, computing the display text once.
    pub fn new(
        id: AlarmId,
        description: &str,
        fire_at: DateTime<Local>,
        repeat: bool,
        occurrence: u32,
    ) -> Self {
        Self {
            id,
            description: description.to_string(),
            display_text: display_text(description, &fire_at, repeat),
            fire_at,
            repeat,
            occurrence,
        }
    }

    pub fn key(&self) -> AlarmKey {
        AlarmKey::from_description(&self.description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: &str, time: &str) -> DateTime<Local> {
        let naive = schedule::parse_schedule(day, time).unwrap();
        Local.from_local_datetime(&naive).earliest().unwrap()
    }

    #[test]
    fn test_display_text_one_shot() {
        let text = display_text("Meeting", &at("2030-01-01", "09:00"), false);
        assert_eq!(text, "Alarm for Meeting set at 09:00 on 2030-01-01.");
    }

    #[test]
    fn test_display_text_repeating() {
        let text = display_text("Gym", &at("2030-03-04", "18:30"), true);
        assert_eq!(text, "Alarm for Gym set at 18:30 on 2030-03-04 every week.");
    }

    #[test]
    fn test_key_normalizes_description() {
        assert_eq!(
            AlarmKey::from_description("  Morning   Run "),
            AlarmKey::from_description("morning run")
        );
        assert_eq!(AlarmKey::from_description("Morning Run").as_str(), "morning run");
        assert!(AlarmKey::from_description(" \t ").is_empty());
    }

    #[test]
    fn test_spec_trims_description() {
        let spec = AlarmSpec::new("  Meeting ", at("2030-01-01", "09:00"), false).unwrap();
        assert_eq!(spec.description, "Meeting");
        assert_eq!(spec.display_text(), "Alarm for Meeting set at 09:00 on 2030-01-01.");
    }

    #[test]
    fn test_spec_rejects_blank_description() {
        let result = AlarmSpec::new("   ", at("2030-01-01", "09:00"), false);
        assert_eq!(result, Err(DomainError::EmptyDescription));
    }

    #[test]
    fn test_spec_parse_rejects_bad_time() {
        let result = AlarmSpec::parse("Meeting", "2030-01-01", "9am", false);
        assert!(matches!(result, Err(DomainError::InvalidSchedule { .. })));
    }

    #[test]
    fn test_view_serialization_roundtrip() {
        let view = AlarmView::new(AlarmId::new(7), "Meeting", at("2030-01-01", "09:00"), true, 2);
        let json = serde_json::to_string(&view).unwrap();
        assert!(json.contains("\"id\":7"));
        let parsed: AlarmView = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, view);
    }

    #[test]
    fn test_alarm_id_display() {
        assert_eq!(AlarmId::new(42).to_string(), "#42");
    }
}
