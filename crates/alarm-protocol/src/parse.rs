//! Parsing of alarm creation requests.
//!
//! Front ends submit either a `day` + `time` pair or a single `alarm` value in
//! HTML `datetime-local` form. `repeat` may be a JSON boolean or the string a
//! checkbox form field produces ("true", "on").

use alarm_core::{parse_datetime_local, parse_schedule, AlarmSpec, DomainError, DomainResult};
use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};

/// Raw create-alarm payload as it arrives on the wire.
///
/// All schedule fields are optional so that partial form submissions parse and
/// are rejected with a meaningful `InvalidSchedule` instead of a JSON error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawAlarmRequest {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    /// Combined `YYYY-MM-DDTHH:MM` value, used when `day`/`time` are absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alarm: Option<String>,
    #[serde(default, deserialize_with = "deserialize_repeat")]
    pub repeat: bool,
}

impl RawAlarmRequest {
    /// Creates a request from separate day and time strings.
    pub fn new(
        description: impl Into<String>,
        day: impl Into<String>,
        time: impl Into<String>,
        repeat: bool,
    ) -> Self {
        Self {
            description: description.into(),
            day: Some(day.into()),
            time: Some(time.into()),
            alarm: None,
            repeat,
        }
    }

    /// Creates a request from a combined `datetime-local` value.
    pub fn from_datetime_local(
        description: impl Into<String>,
        alarm: impl Into<String>,
        repeat: bool,
    ) -> Self {
        Self {
            description: description.into(),
            day: None,
            time: None,
            alarm: Some(alarm.into()),
            repeat,
        }
    }

    /// Resolves the naive local timestamp the request asks for.
    ///
    /// `day` + `time` win over `alarm` when both are present.
    pub fn schedule(&self) -> DomainResult<NaiveDateTime> {
        match (&self.day, &self.time, &self.alarm) {
            (Some(day), Some(time), _) => parse_schedule(day, time),
            (_, _, Some(alarm)) => parse_datetime_local(alarm),
            (Some(day), None, None) => Err(DomainError::invalid_schedule(day, "missing time")),
            (None, Some(time), None) => Err(DomainError::invalid_schedule(time, "missing day")),
            (None, None, None) => Err(DomainError::invalid_schedule("", "missing day and time")),
        }
    }

    /// Validates the request into an `AlarmSpec`.
    pub fn to_spec(&self) -> DomainResult<AlarmSpec> {
        AlarmSpec::from_naive(&self.description, self.schedule()?, self.repeat)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawRepeat {
    Flag(bool),
    Text(String),
}

fn deserialize_repeat<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<RawRepeat>::deserialize(deserializer)?;
    Ok(match raw {
        None => false,
        Some(RawRepeat::Flag(flag)) => flag,
        Some(RawRepeat::Text(text)) => matches!(
            text.trim().to_ascii_lowercase().as_str(),
            "true" | "on" | "yes" | "1"
        ),
    })
}
