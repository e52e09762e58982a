//! Plain-text rendering of the dashboard and the workout view.

use std::collections::HashMap;
use std::fmt::Write;
use std::sync::Arc;

use crate::models::Routine;
use crate::timer::{SessionStatus, WorkoutSnapshot};

/// `MM:SS`; minutes keep counting past 59.
pub fn format_time(total_secs: u64) -> String {
    format!("{:02}:{:02}", total_secs / 60, total_secs % 60)
}

/// One card per routine, with the last completion date when there is one.
pub fn render_dashboard(routines: &[Arc<Routine>], history: &HashMap<String, String>) -> String {
    if routines.is_empty() {
        return "No routines available.".to_string();
    }

    let mut out = String::new();
    for routine in routines {
        let _ = writeln!(out, "[{}] {}", routine.id, routine.title);
        if !routine.description.is_empty() {
            let _ = writeln!(out, "    {}", routine.description);
        }
        let _ = write!(
            out,
            "    {} | {} min | {} segments",
            routine.intensity,
            routine.total_minutes(),
            routine.segment_count()
        );
        if let Some(date) = history.get(&routine.id) {
            let _ = write!(out, " | Completed {date}");
        }
        out.push('\n');
    }
    out.trim_end().to_string()
}

pub fn render_snapshot(snapshot: &WorkoutSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}  {}  [{}]",
        format_time(snapshot.remaining_seconds),
        snapshot.phase_name,
        status_label(snapshot.status)
    );
    if !snapshot.instruction.is_empty() {
        let _ = writeln!(out, "  {}", snapshot.instruction);
    }
    if snapshot.segment_count > 0 {
        let _ = write!(
            out,
            "  Segment {}/{}  Next: {}  {}%",
            snapshot.segment_index + 1,
            snapshot.segment_count,
            snapshot.next_phase_name,
            snapshot.progress_percent.floor() as u64
        );
    }
    out.trim_end().to_string()
}

fn status_label(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Idle => "ready",
        SessionStatus::Running => "running",
        SessionStatus::Paused => "paused",
        SessionStatus::Finished => "done",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Segment;

    fn snapshot() -> WorkoutSnapshot {
        WorkoutSnapshot {
            status: SessionStatus::Running,
            routine_title: "Intervals".into(),
            segment_index: 1,
            segment_count: 3,
            remaining_seconds: 75,
            phase_name: "Sprint".into(),
            instruction: "Go hard".into(),
            next_phase_name: "Rest".into(),
            color: "#f44336".into(),
            progress_percent: 33.9,
        }
    }

    #[test]
    fn formats_minutes_and_seconds() {
        assert_eq!(format_time(0), "00:00");
        assert_eq!(format_time(75), "01:15");
        assert_eq!(format_time(3_600), "60:00");
    }

    #[test]
    fn workout_view_floors_progress() {
        let text = render_snapshot(&snapshot());
        assert!(text.starts_with("01:15  Sprint  [running]"));
        assert!(text.contains("Go hard"));
        assert!(text.contains("Segment 2/3  Next: Rest  33%"));
    }

    #[test]
    fn dashboard_shows_completion_dates() {
        let routine = Arc::new(Routine {
            id: "core".into(),
            title: "Core".into(),
            description: "Abs and back".into(),
            intensity: "low".into(),
            segments: vec![Segment::new("Plank", 60), Segment::new("Bridge", 90)],
        });
        let mut history = HashMap::new();
        history.insert("core".to_string(), "2024-03-01".to_string());

        let text = render_dashboard(&[routine.clone()], &history);
        assert!(text.contains("[core] Core"));
        assert!(text.contains("low | 2 min | 2 segments | Completed 2024-03-01"));

        let text = render_dashboard(&[routine], &HashMap::new());
        assert!(!text.contains("Completed"));
    }
}
