//! Integration tests for the alarm scheduler.
//!
//! Timer tests run on a paused tokio clock with `TokioClock`, so an alarm a
//! week away fires as soon as the runtime is idle.

use std::sync::Arc;
use std::time::Duration;

use alarm_core::{notice, parse_schedule, repeat_interval, to_local};
use alarmd::clock::{Clock, TokioClock};
use alarmd::event_log::EventLog;
use alarmd::notifier::RecordingNotifier;
use alarmd::registry::RegistryError;
use alarmd::scheduler::{AlarmScheduler, SchedulerError};
use alarmd::spawn_scheduler;
use chrono::{DateTime, Datelike, Local, TimeDelta};

// ============================================================================
// Test Harness
// ============================================================================

fn local(day: &str, time: &str) -> DateTime<Local> {
    to_local(parse_schedule(day, time).unwrap()).unwrap()
}

struct Harness {
    scheduler: AlarmScheduler,
    recorder: RecordingNotifier,
    clock: Arc<TokioClock>,
}

impl Harness {
    /// Wall clock starts at 2030-01-01 08:00 local time.
    fn new() -> Self {
        let recorder = RecordingNotifier::new();
        let clock = Arc::new(TokioClock::starting_at(local("2030-01-01", "08:00")));
        let scheduler = spawn_scheduler(
            Arc::new(recorder.clone()),
            Duration::from_secs(5),
            EventLog::disabled(),
            clock.clone(),
        );
        Self {
            scheduler,
            recorder,
            clock,
        }
    }

    async fn advance_to(&self, at: DateTime<Local>) {
        self.clock.sleep_until(at).await;
        self.settle().await;
    }

    /// Lets woken tasks finish their registry round trips.
    async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    fn terminal_notices(notices: &[String]) -> usize {
        notices
            .iter()
            .filter(|n| n.ends_with("has expired.") || n.ends_with("has been cancelled."))
            .count()
    }
}

// ============================================================================
// Create / Cancel
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_create_then_cancel_meeting() {
    let h = Harness::new();

    let view = h
        .scheduler
        .create_alarm("Meeting", "2030-01-01", "09:00", false)
        .await
        .expect("alarm should be scheduled");

    assert_eq!(view.display_text, "Alarm for Meeting set at 09:00 on 2030-01-01.");
    assert_eq!(
        h.scheduler.list_pending().await,
        vec!["Alarm for Meeting set at 09:00 on 2030-01-01."]
    );
    assert_eq!(h.scheduler.live_timers(), 1);

    h.scheduler.cancel("Meeting").await.expect("cancel should succeed");
    h.settle().await;

    assert!(h.scheduler.list_pending().await.is_empty());
    assert_eq!(h.scheduler.list_notices().await, vec!["Meeting has been cancelled."]);
    assert_eq!(h.scheduler.live_timers(), 0);

    assert_eq!(
        h.recorder.messages(),
        vec![
            "Alarm for Meeting set at 09:00 on 2030-01-01.".to_string(),
            "Alarm for Meeting has been cancelled.".to_string(),
        ]
    );

    // The cancelled timer never fires.
    h.advance_to(local("2030-01-01", "10:00")).await;
    assert_eq!(h.scheduler.list_notices().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_unknown_description() {
    let h = Harness::new();
    h.scheduler
        .create_alarm("Meeting", "2030-01-01", "09:00", false)
        .await
        .unwrap();

    let result = h.scheduler.cancel("Dentist").await;
    assert!(matches!(
        result,
        Err(SchedulerError::Registry(RegistryError::NotFound(_)))
    ));
    h.settle().await;

    assert_eq!(h.scheduler.list_pending().await.len(), 1);
    assert_eq!(h.scheduler.list_notices().await, vec![notice::INVALID_CANCEL]);
    assert_eq!(h.recorder.messages().last().map(String::as_str), Some(notice::INVALID_CANCEL));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_by_display_text() {
    let h = Harness::new();
    let view = h
        .scheduler
        .create_alarm("Gym", "2030-01-02", "18:30", true)
        .await
        .unwrap();

    h.scheduler.cancel(&view.display_text).await.unwrap();
    assert!(h.scheduler.list_pending().await.is_empty());
    assert_eq!(h.scheduler.list_notices().await, vec!["Gym has been cancelled."]);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_request_is_noticed() {
    let h = Harness::new();

    let result = h.scheduler.create_alarm("Meeting", "2030-02-30", "09:00", false).await;
    assert!(matches!(result, Err(SchedulerError::InvalidRequest(_))));
    h.settle().await;

    assert!(h.scheduler.list_pending().await.is_empty());
    let notices = h.scheduler.list_notices().await;
    assert_eq!(notices.len(), 1);
    assert!(notices[0].starts_with("Alarm for Meeting could not be set"));
    assert_eq!(h.recorder.messages(), notices);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_description_rejected() {
    let h = Harness::new();
    h.scheduler
        .create_alarm("Meeting", "2030-01-01", "09:00", false)
        .await
        .unwrap();

    let result = h
        .scheduler
        .create_alarm("meeting", "2030-01-03", "10:00", false)
        .await;
    assert!(matches!(
        result,
        Err(SchedulerError::Registry(RegistryError::DuplicateDescription(_)))
    ));

    assert_eq!(h.scheduler.list_pending().await.len(), 1);
    assert_eq!(
        h.scheduler.list_notices().await,
        vec![notice::duplicate_notice("meeting")]
    );
    assert_eq!(h.scheduler.live_timers(), 1);
}

// ============================================================================
// One-Shot Expiration
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_one_shot_fires_at_fire_time_not_before() {
    let h = Harness::new();
    let fire_at = local("2030-01-01", "09:00");
    h.scheduler
        .create_alarm("Meeting", "2030-01-01", "09:00", false)
        .await
        .unwrap();

    h.advance_to(fire_at - TimeDelta::seconds(1)).await;
    assert_eq!(h.scheduler.list_pending().await.len(), 1);
    assert!(h.scheduler.list_notices().await.is_empty());

    h.advance_to(fire_at + TimeDelta::seconds(1)).await;
    assert!(h.scheduler.list_pending().await.is_empty());
    assert_eq!(
        h.scheduler.list_notices().await,
        vec!["Alarm for Meeting set at 09:00 on 2030-01-01 has expired."]
    );
    assert_eq!(
        h.recorder.messages().last().map(String::as_str),
        Some("Alarm for Meeting has expired.")
    );
    assert_eq!(h.scheduler.live_timers(), 0);

    // Exactly one expiration, even much later.
    h.advance_to(fire_at + TimeDelta::days(30)).await;
    assert_eq!(h.scheduler.list_notices().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_past_fire_time_fires_immediately() {
    let h = Harness::new();

    h.scheduler
        .create_alarm("Breakfast", "2030-01-01", "07:00", false)
        .await
        .unwrap();
    h.settle().await;

    assert!(h.scheduler.list_pending().await.is_empty());
    assert_eq!(
        h.scheduler.list_notices().await,
        vec!["Alarm for Breakfast set at 07:00 on 2030-01-01 has expired."]
    );
}

// ============================================================================
// Weekly Repeat
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_repeating_alarm_rearms_weekly() {
    let h = Harness::new();
    let first = local("2030-01-01", "09:00");
    h.scheduler
        .create_alarm("Gym", "2030-01-01", "09:00", true)
        .await
        .unwrap();

    let weeks = 3;
    h.advance_to(first + repeat_interval() * (weeks - 1) + TimeDelta::seconds(1))
        .await;

    let notices = h.scheduler.list_notices().await;
    assert_eq!(notices.len(), weeks as usize);
    assert!(notices.iter().all(|n| n == &notice::rearmed_notice("Gym")));

    let snapshot = h.scheduler.snapshot().await;
    assert_eq!(snapshot.alarms.len(), 1);
    let next = &snapshot.alarms[0];
    assert_eq!(next.fire_at, first + repeat_interval() * weeks);
    assert_eq!(next.occurrence, weeks as u32 + 1);
    assert!(next.display_text.ends_with(" every week."));
    assert_eq!(h.scheduler.live_timers(), 1);

    // Each expiration is announced once.
    let spoken = h
        .recorder
        .messages()
        .iter()
        .filter(|m| **m == notice::rearmed_notice("Gym"))
        .count();
    assert_eq!(spoken, weeks as usize);
}

#[tokio::test(start_paused = true)]
async fn test_past_repeating_alarm_skips_to_next_week() {
    let h = Harness::new();
    let created_for = local("2029-12-17", "09:00");
    h.scheduler
        .create_alarm("Gym", "2029-12-17", "09:00", true)
        .await
        .unwrap();
    h.settle().await;

    // One expiration for the missed time, then the first weekly slot ahead
    assert_eq!(
        h.scheduler.list_notices().await,
        vec![notice::rearmed_notice("Gym")]
    );
    let snapshot = h.scheduler.snapshot().await;
    assert_eq!(snapshot.alarms.len(), 1);
    let next = &snapshot.alarms[0];
    assert_eq!(next.fire_at, local("2030-01-07", "09:00"));
    assert_eq!(next.fire_at.weekday(), created_for.weekday());
    assert_eq!(next.fire_at.time(), created_for.time());
    assert_eq!(next.occurrence, 2);
    assert_eq!(h.scheduler.live_timers(), 1);

    h.advance_to(local("2030-01-07", "09:00") + TimeDelta::seconds(1))
        .await;
    let snapshot = h.scheduler.snapshot().await;
    let next = &snapshot.alarms[0];
    assert_eq!(next.fire_at, local("2030-01-14", "09:00"));
    assert_eq!(next.occurrence, 3);
}

#[tokio::test(start_paused = true)]
async fn test_repeating_alarm_cancelled_after_rearm() {
    let h = Harness::new();
    let first = local("2030-01-01", "09:00");
    h.scheduler
        .create_alarm("Gym", "2030-01-01", "09:00", true)
        .await
        .unwrap();

    h.advance_to(first + TimeDelta::hours(1)).await;
    assert_eq!(h.scheduler.list_pending().await.len(), 1);

    h.scheduler.cancel("gym").await.expect("re-armed alarm should cancel");
    h.settle().await;
    assert!(h.scheduler.list_pending().await.is_empty());
    assert_eq!(h.scheduler.live_timers(), 0);

    h.advance_to(first + repeat_interval() * 2).await;
    let notices = h.scheduler.list_notices().await;
    assert_eq!(notices.len(), 2);
    assert_eq!(notices[1], "Gym has been cancelled.");
}

// ============================================================================
// Races and Housekeeping
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_cancel_racing_expiration_single_terminal_notice() {
    let h = Harness::new();
    let fire_at = local("2030-01-01", "09:00");
    h.scheduler
        .create_alarm("Meeting", "2030-01-01", "09:00", false)
        .await
        .unwrap();

    h.clock.sleep_until(fire_at).await;
    let _ = h.scheduler.cancel("Meeting").await;
    h.settle().await;

    let notices = h.scheduler.list_notices().await;
    assert_eq!(Harness::terminal_notices(&notices), 1, "notices: {notices:?}");
    assert!(h.scheduler.list_pending().await.is_empty());
    assert_eq!(h.scheduler.live_timers(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_after_fire_is_not_announced() {
    let h = Harness::new();
    h.scheduler
        .create_alarm("Meeting", "2030-01-01", "09:00", false)
        .await
        .unwrap();

    h.advance_to(local("2030-01-01", "09:00")).await;
    let result = h.scheduler.cancel("Meeting").await;
    assert!(matches!(
        result,
        Err(SchedulerError::Registry(RegistryError::AlreadyFired(_)))
    ));
    h.settle().await;

    assert_eq!(
        h.scheduler.list_notices().await,
        vec!["Alarm for Meeting set at 09:00 on 2030-01-01 has expired."]
    );
    assert!(!h.recorder.messages().iter().any(|m| m == notice::INVALID_CANCEL));
}

#[tokio::test(start_paused = true)]
async fn test_clear_notices_keeps_pending() {
    let h = Harness::new();
    h.scheduler
        .create_alarm("Meeting", "2030-01-01", "09:00", false)
        .await
        .unwrap();
    h.scheduler
        .create_alarm("Breakfast", "2030-01-01", "07:00", false)
        .await
        .unwrap();
    h.settle().await;
    assert_eq!(h.scheduler.list_notices().await.len(), 1);

    assert_eq!(h.scheduler.clear_notices().await, Ok(1));
    assert!(h.scheduler.list_notices().await.is_empty());
    assert_eq!(
        h.scheduler.list_pending().await,
        vec!["Alarm for Meeting set at 09:00 on 2030-01-01."]
    );
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_all_timers() {
    let h = Harness::new();
    for (i, day) in ["2030-01-02", "2030-01-03", "2030-01-04"].iter().enumerate() {
        h.scheduler
            .create_alarm(&format!("alarm {i}"), day, "09:00", i % 2 == 0)
            .await
            .unwrap();
    }
    assert_eq!(h.scheduler.live_timers(), 3);

    h.scheduler.shutdown().await;
    assert_eq!(h.scheduler.live_timers(), 0);

    h.advance_to(local("2030-01-10", "09:00")).await;
    assert!(h.scheduler.list_notices().await.is_empty());
}

// ============================================================================
// Event Log
// ============================================================================

#[tokio::test]
async fn test_event_log_records_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("smart_alarm.log");
    let recorder = RecordingNotifier::new();
    let scheduler = spawn_scheduler(
        Arc::new(recorder),
        Duration::from_secs(5),
        EventLog::open(&path),
        Arc::new(alarmd::clock::SystemClock),
    );

    scheduler
        .create_alarm("Past", "2000-01-01", "09:00", false)
        .await
        .unwrap();
    scheduler.clear_notices().await.unwrap();

    let mut content = String::new();
    for _ in 0..100 {
        content = tokio::fs::read_to_string(&path).await.unwrap_or_default();
        if content.lines().count() >= 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert!(content.contains("Alarm for Past set at 09:00 on 2000-01-01."));
    assert!(content.contains("Alarm for Past set at 09:00 on 2000-01-01 has expired."));
    assert!(content.contains(notice::NOTICES_CLEARED));
}
