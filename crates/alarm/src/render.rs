//! Plain-text rendering for the `alarm` command.

use std::fmt::Write;

use alarm_protocol::DaemonMessage;

use crate::client::AlarmState;

/// Renders the pending alarms followed by the notices, one per line.
pub fn render_state(state: &AlarmState) -> String {
    let mut out = String::new();

    out.push_str("Pending alarms:\n");
    if state.alarms.is_empty() {
        out.push_str("  (none)\n");
    }
    for alarm in &state.alarms {
        let _ = writeln!(out, "  {}", alarm.display_text);
    }

    out.push_str("Notifications:\n");
    if state.notices.is_empty() {
        out.push_str("  (none)\n");
    }
    for notice in &state.notices {
        let _ = writeln!(out, "  {notice}");
    }

    out
}

/// One line describing a pushed event, or `None` for non-events.
pub fn render_event(message: &DaemonMessage) -> Option<String> {
    let line = match message {
        DaemonMessage::AlarmScheduled { alarm } => format!("scheduled: {}", alarm.display_text),
        DaemonMessage::AlarmCancelled { alarm } => format!("cancelled: {}", alarm.display_text),
        DaemonMessage::AlarmFired { alarm, next } => match next {
            Some(next) => format!(
                "fired: {} (next: {})",
                alarm.description,
                next.fire_at.format("%Y-%m-%d %H:%M")
            ),
            None => format!("fired: {}", alarm.description),
        },
        DaemonMessage::NoticeAdded { text } => format!("notice: {text}"),
        DaemonMessage::NoticesCleared { cleared } => format!("notices cleared ({cleared})"),
        _ => return None,
    };
    Some(line)
}
