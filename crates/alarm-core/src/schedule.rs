//! Parsing of user-supplied alarm schedules.
//!
//! The one textual contract the service owns is the local date/time pair
//! `YYYY-MM-DD` + `HH:MM` (no timezone). The combined HTML `datetime-local`
//! form `YYYY-MM-DDTHH:MM` is accepted as well.

use chrono::{DateTime, Local, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Timelike};

use crate::error::{DomainError, DomainResult};

/// Format of the day component.
pub const DAY_FORMAT: &str = "%Y-%m-%d";

/// Format of the time component.
pub const TIME_FORMAT: &str = "%H:%M";

/// Seconds between two occurrences of a repeating alarm (one week).
pub const REPEAT_INTERVAL_SECS: i64 = 604_800;

/// Returns the repeat interval as a `TimeDelta`.
pub fn repeat_interval() -> TimeDelta {
    TimeDelta::seconds(REPEAT_INTERVAL_SECS)
}

/// Parses a `YYYY-MM-DD` day.
pub fn parse_day(day: &str) -> DomainResult<NaiveDate> {
    let day = day.trim();
    if day.is_empty() {
        return Err(DomainError::invalid_schedule(day, "missing day"));
    }
    NaiveDate::parse_from_str(day, DAY_FORMAT)
        .map_err(|e| DomainError::invalid_schedule(day, format!("expected YYYY-MM-DD ({e})")))
}

/// Parses an `HH:MM` time. A trailing `:SS` is accepted and dropped.
pub fn parse_time(time: &str) -> DomainResult<NaiveTime> {
    let time = time.trim();
    if time.is_empty() {
        return Err(DomainError::invalid_schedule(time, "missing time"));
    }
    NaiveTime::parse_from_str(time, TIME_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(time, "%H:%M:%S"))
        .map(|t| t.with_second(0).unwrap_or(t))
        .map_err(|e| DomainError::invalid_schedule(time, format!("expected HH:MM ({e})")))
}

/// Parses a day + time pair into a naive local timestamp.
pub fn parse_schedule(day: &str, time: &str) -> DomainResult<NaiveDateTime> {
    let date = parse_day(day)?;
    let time = parse_time(time)?;
    Ok(date.and_time(time))
}

/// Parses the combined `YYYY-MM-DDTHH:MM` form (a space separator works too).
pub fn parse_datetime_local(value: &str) -> DomainResult<NaiveDateTime> {
    let value = value.trim();
    let day = value.get(..10);
    let separator = value.get(10..11);
    let time = value.get(11..);

    match (day, separator, time) {
        (Some(day), Some("T" | " "), Some(time)) => parse_schedule(day, time),
        _ => Err(DomainError::invalid_schedule(
            value,
            "expected YYYY-MM-DDTHH:MM",
        )),
    }
}

/// Resolves a naive timestamp in the local time zone.
///
/// Ambiguous wall-clock times (DST fall-back) resolve to the earlier instant;
/// times skipped by a DST jump are rejected.
pub fn to_local(naive: NaiveDateTime) -> DomainResult<DateTime<Local>> {
    match Local.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Ok(dt),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest),
        LocalResult::None => Err(DomainError::invalid_schedule(
            naive.format("%Y-%m-%d %H:%M").to_string(),
            "time does not exist in the local time zone",
        )),
    }
}

/// Computes the next fire time of a repeating alarm.
///
/// Normally this is `fire_at` plus one week. If that is still not after
/// `now` (the alarm was created in the past), whole weeks are skipped so the
/// next occurrence lands in the future on the same weekday and time.
pub fn next_occurrence(fire_at: DateTime<Local>, now: DateTime<Local>) -> DateTime<Local> {
    let step = repeat_interval();
    let next = fire_at + step;
    if next > now {
        return next;
    }

    let behind = now.signed_duration_since(next).num_seconds() / REPEAT_INTERVAL_SECS + 1;
    let skip = i32::try_from(behind).unwrap_or(i32::MAX);
    step.checked_mul(skip)
        .and_then(|delta| next.checked_add_signed(delta))
        .unwrap_or(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn test_parse_schedule() {
        let naive = parse_schedule("2030-01-01", "09:00").unwrap();
        assert_eq!(naive.year(), 2030);
        assert_eq!(naive.month(), 1);
        assert_eq!(naive.day(), 1);
        assert_eq!(naive.hour(), 9);
        assert_eq!(naive.minute(), 0);
    }

    #[test]
    fn test_parse_schedule_trims_whitespace() {
        assert!(parse_schedule(" 2030-01-01 ", " 09:00\n").is_ok());
    }

    #[test]
    fn test_parse_time_drops_seconds() {
        let time = parse_time("07:45:30").unwrap();
        assert_eq!(time.second(), 0);
        assert_eq!(time.minute(), 45);
    }

    #[test]
    fn test_parse_schedule_rejects_malformed() {
        for (day, time) in [
            ("2030-13-01", "09:00"),
            ("2030-02-30", "09:00"),
            ("01/01/2030", "09:00"),
            ("2030-01-01", "25:00"),
            ("2030-01-01", "nine"),
            ("", "09:00"),
            ("2030-01-01", ""),
        ] {
            let result = parse_schedule(day, time);
            assert!(
                matches!(result, Err(DomainError::InvalidSchedule { .. })),
                "expected InvalidSchedule for ({day:?}, {time:?}), got {result:?}"
            );
        }
    }

    #[test]
    fn test_parse_datetime_local() {
        let a = parse_datetime_local("2030-01-01T09:00").unwrap();
        let b = parse_datetime_local("2030-01-01 09:00").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, parse_schedule("2030-01-01", "09:00").unwrap());
    }

    #[test]
    fn test_parse_datetime_local_rejects_bad_separator() {
        assert!(parse_datetime_local("2030-01-01X09:00").is_err());
        assert!(parse_datetime_local("2030-01-01").is_err());
        assert!(parse_datetime_local("").is_err());
    }

    #[test]
    fn test_parse_datetime_local_multibyte_does_not_panic() {
        assert!(parse_datetime_local("2030-01-0é 09:00").is_err());
    }

    #[test]
    fn test_repeat_interval_is_one_week() {
        assert_eq!(repeat_interval().num_seconds(), 604_800);
        assert_eq!(repeat_interval().num_days(), 7);
    }

    #[test]
    fn test_next_occurrence_adds_one_week() {
        let fire_at = Local::now() + TimeDelta::minutes(5);
        let next = next_occurrence(fire_at, fire_at);
        assert_eq!(next - fire_at, repeat_interval());
    }

    #[test]
    fn test_next_occurrence_skips_missed_weeks() {
        let now = Local::now();
        let fire_at = now - TimeDelta::days(20);
        let next = next_occurrence(fire_at, now);
        assert!(next > now);
        assert!(next - now <= repeat_interval());
        assert_eq!((next - fire_at).num_seconds() % REPEAT_INTERVAL_SECS, 0);
        assert_eq!(next - fire_at, repeat_interval() * 3);
    }
}
