//! Workout state machine.
//!
//! The engine owns the [`Session`] and is the only place that decides when a
//! side effect happens. Side effects leave through three narrow seams so the
//! same engine drives real speech and wake locks or test recorders.

use std::sync::Arc;

use chrono::{Local, NaiveDate};
use log::{debug, info};
use serde::Serialize;

use crate::models::Routine;

use super::clock::Clock;
use super::index::{locate, total_duration};
use super::state::{Session, SessionStatus};

pub const COMPLETION_ANNOUNCEMENT: &str = "Workout complete! Great job!";
const UPCOMING_CUE_SECS: u64 = 30;
const FINAL_COUNT_SECS: u64 = 5;

/// Spoken-cue channel. The engine never waits on it.
pub trait Announce: Send + Sync {
    fn prime_for_user_gesture(&self);
    fn announce(&self, text: &str);
    fn cancel(&self);
    fn resume_host(&self);
}

/// Keeps the display awake while a workout runs.
pub trait DisplayGuard: Send {
    fn acquire(&mut self);
    fn release(&mut self);
    fn is_held(&mut self) -> bool;
}

/// Receives exactly one call per natural completion.
pub trait HistorySink: Send + Sync {
    fn record_completion(&self, routine_id: &str, completed_on: NaiveDate);
}

/// What the presentation layer renders. Pure projection of engine state.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutSnapshot {
    pub status: SessionStatus,
    pub routine_title: String,
    pub segment_index: usize,
    pub segment_count: usize,
    pub remaining_seconds: u64,
    pub phase_name: String,
    pub instruction: String,
    pub next_phase_name: String,
    pub color: String,
    pub progress_percent: f64,
}

impl WorkoutSnapshot {
    fn empty() -> Self {
        Self {
            status: SessionStatus::Idle,
            routine_title: String::new(),
            segment_index: 0,
            segment_count: 0,
            remaining_seconds: 0,
            phase_name: String::new(),
            instruction: String::new(),
            next_phase_name: String::new(),
            color: String::new(),
            progress_percent: 0.0,
        }
    }
}

pub struct WorkoutEngine {
    clock: Arc<dyn Clock>,
    announcer: Arc<dyn Announce>,
    guard: Box<dyn DisplayGuard>,
    history: Arc<dyn HistorySink>,
    routine: Option<Arc<Routine>>,
    session: Session,
}

impl WorkoutEngine {
    pub fn new(
        clock: Arc<dyn Clock>,
        announcer: Arc<dyn Announce>,
        guard: Box<dyn DisplayGuard>,
        history: Arc<dyn HistorySink>,
    ) -> Self {
        Self {
            clock,
            announcer,
            guard,
            history,
            routine: None,
            session: Session::new(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn status(&self) -> SessionStatus {
        self.session.status
    }

    pub fn routine(&self) -> Option<&Arc<Routine>> {
        self.routine.as_ref()
    }

    /// Selects a routine and discards whatever session existed before.
    pub fn load(&mut self, routine: Arc<Routine>) {
        if self.session.status.is_active() {
            self.stop();
        }
        info!("loaded routine {} ({} segments)", routine.id, routine.segments.len());
        self.routine = Some(routine);
        self.session.reset();
    }

    /// Leaves the workout view: stops any session and forgets the routine.
    pub fn unload(&mut self) {
        if self.session.status.is_active() {
            self.stop();
        }
        self.routine = None;
        self.session.reset();
    }

    /// Begins the loaded routine. Everything here runs synchronously in the
    /// caller so gesture-gated host APIs see the user action.
    pub fn start(&mut self) {
        if self.session.status != SessionStatus::Idle {
            debug!("start ignored in status {}", self.session.status.as_str());
            return;
        }
        let Some(routine) = self.routine.clone() else {
            debug!("start ignored: no routine loaded");
            return;
        };
        let Some(first) = routine.segments.first() else {
            debug!("start ignored: routine {} has no segments", routine.id);
            return;
        };

        self.announcer.prime_for_user_gesture();
        self.guard.acquire();

        self.session.begin(self.clock.now_ms());
        info!("session {} started routine {}", self.session.id, routine.id);
        self.announcer.announce(&format!("Starting {}", first.phase));

        self.evaluate();
    }

    /// Periodic re-evaluation. Does nothing unless running.
    pub fn tick(&mut self) {
        if self.session.status != SessionStatus::Running {
            return;
        }
        self.evaluate();
    }

    pub fn pause(&mut self) {
        if self.session.status != SessionStatus::Running {
            debug!("pause ignored in status {}", self.session.status.as_str());
            return;
        }
        // A routine that ran out since the last tick completes instead.
        self.evaluate();
        if self.session.status != SessionStatus::Running {
            return;
        }
        self.session.pause(self.clock.now_ms());
        self.announcer.cancel();
        self.guard.release();
        info!(
            "session {} paused at {}s",
            self.session.id,
            self.session.elapsed_secs()
        );
    }

    pub fn resume(&mut self) {
        if self.session.status != SessionStatus::Paused {
            debug!("resume ignored in status {}", self.session.status.as_str());
            return;
        }
        self.session.resume(self.clock.now_ms());
        self.guard.acquire();
        info!("session {} resumed", self.session.id);
    }

    /// Abandons the session. Never writes history.
    pub fn stop(&mut self) {
        if !self.session.status.is_active() {
            debug!("stop ignored in status {}", self.session.status.as_str());
            return;
        }
        self.announcer.cancel();
        self.guard.release();
        info!(
            "session {} stopped at {}s",
            self.session.id,
            self.session.elapsed_secs()
        );
        self.session.reset();
    }

    /// Host brought the app back to the foreground.
    pub fn on_visibility_restored(&mut self) {
        if self.session.status == SessionStatus::Running {
            self.evaluate();
            if self.session.status == SessionStatus::Running && !self.guard.is_held() {
                self.guard.acquire();
            }
        }
        self.announcer.resume_host();
    }

    fn evaluate(&mut self) {
        let Some(routine) = self.routine.clone() else {
            return;
        };
        let elapsed_secs = self.session.observe_elapsed_ms(self.clock.now_ms()) / 1000;

        let Some(position) = locate(&routine.segments, elapsed_secs) else {
            self.finish(&routine);
            return;
        };

        if position.index != self.session.active_segment_index {
            debug!(
                "session {}: segment {} -> {}",
                self.session.id, self.session.active_segment_index, position.index
            );
            self.session.active_segment_index = position.index;
            self.session.last_announced_second = None;
            self.announcer
                .announce(&format!("Starting {}", position.segment.phase));
        }

        // Runs in the same pass as a boundary: a countdown due right away
        // replaces the "Starting" cue under last-call-wins.
        if self.session.last_announced_second != Some(position.offset) {
            self.session.last_announced_second = Some(position.offset);
            let next = routine.segments.get(position.index + 1);
            if let Some(cue) = countdown_cue(position.remaining, next.map(|s| s.phase.as_str())) {
                self.announcer.announce(&cue);
            }
        }
    }

    fn finish(&mut self, routine: &Routine) {
        self.session.finish();
        info!("session {} completed routine {}", self.session.id, routine.id);
        self.announcer.announce(COMPLETION_ANNOUNCEMENT);
        self.history
            .record_completion(&routine.id, Local::now().date_naive());
        self.guard.release();
    }

    pub fn snapshot(&self) -> WorkoutSnapshot {
        let Some(routine) = self.routine.as_ref() else {
            return WorkoutSnapshot::empty();
        };
        let segments = &routine.segments;
        let total = total_duration(segments);
        let next_name = |index: usize| {
            segments
                .get(index + 1)
                .map(|s| s.phase.clone())
                .unwrap_or_else(|| "Finish".to_string())
        };

        let mut snapshot = WorkoutSnapshot {
            status: self.session.status,
            routine_title: routine.title.clone(),
            segment_count: segments.len(),
            ..WorkoutSnapshot::empty()
        };

        match self.session.status {
            SessionStatus::Idle => {
                if let Some(first) = segments.first() {
                    snapshot.remaining_seconds = first.duration;
                    snapshot.phase_name = "Ready to Start".into();
                    snapshot.instruction = first.instruction.clone();
                    snapshot.color = first.color.clone();
                    snapshot.next_phase_name = next_name(0);
                }
            }
            SessionStatus::Finished => {
                snapshot.segment_index = segments.len().saturating_sub(1);
                snapshot.phase_name = "Complete!".into();
                snapshot.instruction = "Great job!".into();
                snapshot.next_phase_name = "Finish".into();
                snapshot.progress_percent = 100.0;
            }
            SessionStatus::Running | SessionStatus::Paused => {
                let elapsed = self.session.elapsed_secs();
                if let Some(position) = locate(segments, elapsed) {
                    snapshot.segment_index = position.index;
                    snapshot.remaining_seconds = position.remaining;
                    snapshot.phase_name = position.segment.phase.clone();
                    snapshot.instruction = position.segment.instruction.clone();
                    snapshot.color = position.segment.color.clone();
                    snapshot.next_phase_name = next_name(position.index);
                }
                snapshot.progress_percent = progress_percent(elapsed, total);
            }
        }

        snapshot
    }
}

fn progress_percent(elapsed_secs: u64, total_secs: u64) -> f64 {
    if total_secs == 0 {
        return 100.0;
    }
    (elapsed_secs as f64 / total_secs as f64 * 100.0).min(100.0)
}

/// Cue for a given remaining count. The 30-second warning needs a successor.
fn countdown_cue(remaining: u64, next_phase: Option<&str>) -> Option<String> {
    if remaining == UPCOMING_CUE_SECS {
        return next_phase.map(|phase| format!("In 30 seconds, {phase}"));
    }
    if (1..=FINAL_COUNT_SECS).contains(&remaining) {
        return Some(remaining.to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Segment;
    use crate::timer::clock::ManualClock;
    use crate::timer::testing::{CountingHistory, FakeGuard, RecordingAnnouncer};

    struct Harness {
        clock: ManualClock,
        announcer: Arc<RecordingAnnouncer>,
        guard: FakeGuard,
        history: Arc<CountingHistory>,
        engine: WorkoutEngine,
    }

    fn routine(segments: Vec<Segment>) -> Arc<Routine> {
        Arc::new(Routine {
            id: "intervals".into(),
            title: "Intervals".into(),
            description: String::new(),
            intensity: "high".into(),
            segments,
        })
    }

    fn sample_routine() -> Arc<Routine> {
        routine(vec![
            Segment::new("Warm-up", 10),
            Segment::new("Sprint", 5),
            Segment::new("Cool-down", 10),
        ])
    }

    fn harness(routine: Arc<Routine>) -> Harness {
        let clock = ManualClock::new(1_000_000);
        let announcer = Arc::new(RecordingAnnouncer::default());
        let guard = FakeGuard::default();
        let history = Arc::new(CountingHistory::default());
        let mut engine = WorkoutEngine::new(
            Arc::new(clock.clone()),
            announcer.clone(),
            Box::new(guard.clone()),
            history.clone(),
        );
        engine.load(routine);
        Harness {
            clock,
            announcer,
            guard,
            history,
            engine,
        }
    }

    #[test]
    fn start_primes_acquires_and_announces_first_segment() {
        let mut h = harness(sample_routine());
        h.engine.start();

        assert_eq!(h.engine.status(), SessionStatus::Running);
        assert_eq!(*h.announcer.primes.lock().unwrap(), 1);
        assert_eq!(h.announcer.spoken(), vec!["Starting Warm-up".to_string()]);
        assert!(h.guard.0.lock().unwrap().held);
    }

    #[test]
    fn start_requires_idle_and_a_routine() {
        let mut h = harness(sample_routine());
        h.engine.unload();
        h.engine.start();
        assert_eq!(h.engine.status(), SessionStatus::Idle);

        h.engine.load(sample_routine());
        h.engine.start();
        h.engine.start();
        assert_eq!(h.announcer.count("Starting Warm-up"), 1);
    }

    #[test]
    fn position_depends_only_on_absolute_elapsed() {
        let segments = sample_routine().segments.clone();
        let steps: [i64; 8] = [300, 1_700, 4_000, 50, 2_950, 1_000, 900, 3_100];

        let mut h = harness(sample_routine());
        h.engine.start();
        let mut elapsed_ms = 0i64;
        for step in steps {
            h.clock.advance_ms(step);
            elapsed_ms += step;
            h.engine.tick();

            let expected = locate(&segments, (elapsed_ms / 1000) as u64).unwrap();
            let snapshot = h.engine.snapshot();
            assert_eq!(snapshot.segment_index, expected.index);
            assert_eq!(snapshot.remaining_seconds, expected.remaining);
        }
    }

    #[test]
    fn pause_and_resume_keep_elapsed_continuous() {
        let mut h = harness(sample_routine());
        h.engine.start();
        h.clock.advance_ms(7_400);
        h.engine.tick();
        h.engine.pause();
        assert_eq!(h.engine.session().last_elapsed_ms, 7_400);

        h.clock.advance_secs(600);
        h.engine.tick();
        assert_eq!(h.engine.session().last_elapsed_ms, 7_400);

        h.engine.resume();
        h.engine.tick();
        assert_eq!(h.engine.session().last_elapsed_ms, 7_400);

        h.clock.advance_ms(1_000);
        h.engine.tick();
        assert_eq!(h.engine.session().last_elapsed_ms, 8_400);
        assert_eq!(h.engine.snapshot().remaining_seconds, 2);
    }

    #[test]
    fn pause_cancels_speech_and_releases_guard_resume_reacquires() {
        let mut h = harness(sample_routine());
        h.engine.start();
        h.engine.pause();
        assert_eq!(*h.announcer.cancels.lock().unwrap(), 1);
        assert!(!h.guard.0.lock().unwrap().held);

        h.engine.pause();
        assert_eq!(*h.announcer.cancels.lock().unwrap(), 1);

        h.engine.resume();
        assert!(h.guard.0.lock().unwrap().held);
        assert_eq!(h.guard.0.lock().unwrap().acquires, 2);
    }

    #[test]
    fn completion_happens_once() {
        let mut h = harness(sample_routine());
        h.engine.start();
        h.clock.advance_secs(25);
        for _ in 0..5 {
            h.engine.tick();
        }
        h.clock.advance_secs(100);
        h.engine.tick();

        assert_eq!(h.engine.status(), SessionStatus::Finished);
        assert_eq!(h.announcer.count(COMPLETION_ANNOUNCEMENT), 1);
        assert_eq!(h.history.writes.lock().unwrap().as_slice(), ["intervals"]);
        assert!(!h.guard.0.lock().unwrap().held);

        let snapshot = h.engine.snapshot();
        assert_eq!(snapshot.phase_name, "Complete!");
        assert_eq!(snapshot.progress_percent, 100.0);
    }

    #[test]
    fn delayed_tick_skips_straight_to_current_segment() {
        let mut h = harness(sample_routine());
        h.engine.start();
        h.clock.advance_secs(23);
        h.engine.tick();

        assert_eq!(h.announcer.count("Starting Cool-down"), 1);
        assert_eq!(h.announcer.count("Starting Sprint"), 0);
        assert_eq!(h.engine.session().active_segment_index, 2);
        assert_eq!(h.engine.snapshot().remaining_seconds, 2);
    }

    #[test]
    fn countdown_fires_once_per_second() {
        let mut h = harness(sample_routine());
        h.engine.start();
        h.clock.advance_ms(8_100);
        h.engine.tick();
        h.clock.advance_ms(500);
        h.engine.tick();

        assert_eq!(h.announcer.count("2"), 1);

        h.clock.advance_ms(500);
        h.engine.tick();
        assert_eq!(h.announcer.count("1"), 1);
    }

    #[test]
    fn thirty_second_warning_names_the_next_phase() {
        let mut h = harness(routine(vec![
            Segment::new("Climb", 40),
            Segment::new("Recover", 40),
        ]));
        h.engine.start();
        h.clock.advance_secs(10);
        h.engine.tick();
        assert_eq!(h.announcer.count("In 30 seconds, Recover"), 1);

        // last segment has no successor, so no warning
        h.clock.advance_secs(40);
        h.engine.tick();
        assert!(!h
            .announcer
            .spoken()
            .iter()
            .any(|s| s.starts_with("In 30 seconds") && !s.ends_with("Recover")));
        assert_eq!(h.announcer.spoken().len(), 3);
    }

    #[test]
    fn stop_resets_without_history() {
        let mut h = harness(sample_routine());
        h.engine.start();
        h.clock.advance_secs(12);
        h.engine.tick();
        h.engine.stop();

        assert_eq!(*h.announcer.cancels.lock().unwrap(), 1);
        assert_eq!(h.engine.status(), SessionStatus::Idle);
        assert!(h.history.writes.lock().unwrap().is_empty());
        assert!(!h.guard.0.lock().unwrap().held);
        assert_eq!(h.engine.snapshot().phase_name, "Ready to Start");

        h.clock.advance_secs(100);
        h.engine.tick();
        assert_eq!(h.engine.status(), SessionStatus::Idle);
    }

    #[test]
    fn visibility_restore_recomputes_and_reacquires_revoked_guard() {
        let mut h = harness(sample_routine());
        h.engine.start();
        h.guard.0.lock().unwrap().revoked = true;
        h.clock.advance_secs(11);

        h.engine.on_visibility_restored();

        assert_eq!(h.engine.session().active_segment_index, 1);
        assert_eq!(h.guard.0.lock().unwrap().acquires, 2);
        assert_eq!(*h.announcer.host_resumes.lock().unwrap(), 1);
    }

    #[test]
    fn visibility_restore_while_paused_leaves_guard_released() {
        let mut h = harness(sample_routine());
        h.engine.start();
        h.engine.pause();
        h.engine.on_visibility_restored();
        assert!(!h.guard.0.lock().unwrap().held);
        assert_eq!(h.guard.0.lock().unwrap().acquires, 1);
    }

    #[test]
    fn pause_after_the_end_completes_instead() {
        let mut h = harness(routine(vec![Segment::new("A", 10), Segment::new("B", 5)]));
        h.engine.start();
        h.clock.advance_ms(14_900);
        h.engine.tick();
        h.clock.advance_ms(500);
        h.engine.pause();

        assert_eq!(h.engine.status(), SessionStatus::Finished);
        assert_eq!(h.history.writes.lock().unwrap().len(), 1);
        assert_eq!(h.announcer.count(COMPLETION_ANNOUNCEMENT), 1);
        assert_eq!(h.engine.snapshot().phase_name, "Complete!");

        h.engine.resume();
        h.engine.stop();
        assert_eq!(h.engine.status(), SessionStatus::Finished);
        assert_eq!(h.history.writes.lock().unwrap().len(), 1);
    }

    #[test]
    fn pause_mid_segment_still_pauses() {
        let mut h = harness(sample_routine());
        h.engine.start();
        h.clock.advance_secs(11);
        h.engine.pause();
        assert_eq!(h.engine.status(), SessionStatus::Paused);
        assert_eq!(h.engine.snapshot().phase_name, "Sprint");
    }

    #[test]
    fn countdown_cue_policy() {
        assert_eq!(countdown_cue(30, Some("Rest")).as_deref(), Some("In 30 seconds, Rest"));
        assert_eq!(countdown_cue(30, None), None);
        assert_eq!(countdown_cue(5, None).as_deref(), Some("5"));
        assert_eq!(countdown_cue(6, Some("Rest")), None);
        assert_eq!(countdown_cue(0, Some("Rest")), None);
    }

    #[test]
    fn progress_is_clamped() {
        assert_eq!(progress_percent(50, 100), 50.0);
        assert_eq!(progress_percent(150, 100), 100.0);
    }
}
