use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use log::{debug, info};
use tokio::{sync::watch, task::JoinHandle, time};
use tokio_util::sync::CancellationToken;

use crate::models::Routine;

use super::{SessionStatus, WorkoutEngine, WorkoutSnapshot};

struct Ticker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Drives a [`WorkoutEngine`] from the async runtime: owns the tick source
/// and publishes a snapshot after every transition.
///
/// The engine sits behind a blocking mutex that is never held across an
/// await, so every transition runs to completion before the next starts.
#[derive(Clone)]
pub struct TimerController {
    engine: Arc<Mutex<WorkoutEngine>>,
    snapshots: Arc<watch::Sender<WorkoutSnapshot>>,
    ticker: Arc<Mutex<Option<Ticker>>>,
    tick_interval: Duration,
}

impl TimerController {
    pub fn new(engine: WorkoutEngine, tick_interval: Duration) -> Self {
        let (snapshots, _) = watch::channel(engine.snapshot());
        Self {
            engine: Arc::new(Mutex::new(engine)),
            snapshots: Arc::new(snapshots),
            ticker: Arc::new(Mutex::new(None)),
            tick_interval,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkoutSnapshot> {
        self.snapshots.subscribe()
    }

    pub fn snapshot(&self) -> WorkoutSnapshot {
        self.lock_engine().snapshot()
    }

    pub fn status(&self) -> SessionStatus {
        self.lock_engine().status()
    }

    pub fn routine(&self) -> Option<Arc<Routine>> {
        self.lock_engine().routine().cloned()
    }

    pub fn load(&self, routine: Arc<Routine>) -> WorkoutSnapshot {
        self.cancel_ticker();
        self.transition(|engine| engine.load(routine))
    }

    pub fn unload(&self) -> WorkoutSnapshot {
        self.cancel_ticker();
        self.transition(WorkoutEngine::unload)
    }

    /// Starts the loaded routine. Runs the engine transition synchronously
    /// before spawning the tick task.
    pub fn start(&self) -> WorkoutSnapshot {
        let snapshot = self.transition(WorkoutEngine::start);
        if snapshot.status == SessionStatus::Running {
            self.spawn_ticker();
        }
        snapshot
    }

    pub fn pause(&self) -> WorkoutSnapshot {
        self.transition(WorkoutEngine::pause)
    }

    pub fn resume(&self) -> WorkoutSnapshot {
        self.transition(WorkoutEngine::resume)
    }

    pub fn stop(&self) -> WorkoutSnapshot {
        self.cancel_ticker();
        self.transition(WorkoutEngine::stop)
    }

    pub fn tick(&self) -> WorkoutSnapshot {
        self.transition(WorkoutEngine::tick)
    }

    pub fn on_visibility_restored(&self) -> WorkoutSnapshot {
        debug!("visibility restored");
        self.transition(WorkoutEngine::on_visibility_restored)
    }

    fn transition(&self, op: impl FnOnce(&mut WorkoutEngine)) -> WorkoutSnapshot {
        let snapshot = {
            let mut engine = self.lock_engine();
            op(&mut engine);
            engine.snapshot()
        };
        self.snapshots.send_replace(snapshot.clone());
        snapshot
    }

    fn lock_engine(&self) -> MutexGuard<'_, WorkoutEngine> {
        match self.engine.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn spawn_ticker(&self) {
        self.cancel_ticker();

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let controller = self.clone();
        let tick_interval = self.tick_interval;

        let handle = tokio::spawn(async move {
            let mut interval = time::interval(tick_interval);
            interval.set_missed_tick_behavior(time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        let snapshot = controller.tick();
                        if !snapshot.status.is_active() {
                            info!("tick source stopped ({})", snapshot.status.as_str());
                            break;
                        }
                    }
                }
            }
        });

        let mut ticker = match self.ticker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *ticker = Some(Ticker { cancel, handle });
    }

    fn cancel_ticker(&self) {
        let previous = match self.ticker.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(ticker) = previous {
            ticker.cancel.cancel();
            ticker.handle.abort();
        }
    }

    pub fn is_ticking(&self) -> bool {
        match self.ticker.lock() {
            Ok(guard) => guard
                .as_ref()
                .map(|ticker| !ticker.handle.is_finished())
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Treats SIGCONT (resumed after job-control suspension) as the app
    /// becoming visible again.
    #[cfg(unix)]
    pub fn spawn_visibility_watcher(&self) -> std::io::Result<JoinHandle<()>> {
        use tokio::signal::unix::{signal, SignalKind};

        #[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
        const SIGCONT: i32 = 19;
        #[cfg(not(any(target_os = "macos", target_os = "ios", target_os = "freebsd")))]
        const SIGCONT: i32 = 18;

        let mut continued = signal(SignalKind::from_raw(SIGCONT))?;
        let controller = self.clone();
        Ok(tokio::spawn(async move {
            while continued.recv().await.is_some() {
                controller.on_visibility_restored();
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Segment;
    use crate::timer::clock::ManualClock;
    use crate::timer::engine::COMPLETION_ANNOUNCEMENT;
    use crate::timer::testing::{CountingHistory, FakeGuard, RecordingAnnouncer};

    fn routine() -> Arc<Routine> {
        Arc::new(Routine {
            id: "ladder".into(),
            title: "Ladder".into(),
            description: String::new(),
            intensity: "medium".into(),
            segments: vec![Segment::new("Warm-up", 10), Segment::new("Sprint", 5)],
        })
    }

    type Fixture = (
        TimerController,
        ManualClock,
        Arc<RecordingAnnouncer>,
        Arc<CountingHistory>,
    );

    fn controller() -> Fixture {
        let clock = ManualClock::new(0);
        let announcer = Arc::new(RecordingAnnouncer::default());
        let history = Arc::new(CountingHistory::default());
        let engine = WorkoutEngine::new(
            Arc::new(clock.clone()),
            announcer.clone(),
            Box::new(FakeGuard::default()),
            history.clone(),
        );
        let controller = TimerController::new(engine, Duration::from_millis(100));
        controller.load(routine());
        (controller, clock, announcer, history)
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_publishes_snapshots_and_stops_at_completion() {
        let (controller, clock, announcer, history) = controller();
        let mut updates = controller.subscribe();

        let snapshot = controller.start();
        assert_eq!(snapshot.status, SessionStatus::Running);
        assert!(controller.is_ticking());

        clock.advance_secs(11);
        time::sleep(Duration::from_millis(250)).await;
        assert!(updates.has_changed().unwrap());
        let latest = updates.borrow_and_update().clone();
        assert_eq!(latest.phase_name, "Sprint");
        assert_eq!(latest.remaining_seconds, 4);

        clock.advance_secs(10);
        time::sleep(Duration::from_millis(250)).await;
        assert_eq!(controller.status(), SessionStatus::Finished);
        assert!(!controller.is_ticking());
        assert_eq!(announcer.count(COMPLETION_ANNOUNCEMENT), 1);
        assert_eq!(history.writes.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_the_tick_source() {
        let (controller, clock, _announcer, history) = controller();
        controller.start();
        controller.stop();
        assert!(!controller.is_ticking());

        clock.advance_secs(60);
        time::sleep(Duration::from_millis(500)).await;
        assert_eq!(controller.status(), SessionStatus::Idle);
        assert!(history.writes.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn paused_session_keeps_its_place() {
        let (controller, clock, _announcer, _history) = controller();
        controller.start();
        clock.advance_secs(3);
        time::sleep(Duration::from_millis(150)).await;
        controller.pause();

        clock.advance_secs(120);
        time::sleep(Duration::from_millis(500)).await;
        let snapshot = controller.resume();
        assert_eq!(snapshot.status, SessionStatus::Running);
        assert_eq!(snapshot.phase_name, "Warm-up");
        assert_eq!(snapshot.remaining_seconds, 7);
    }

    #[tokio::test]
    async fn visibility_restore_snaps_to_current_position() {
        let (controller, clock, _announcer, _history) = controller();
        controller.start();
        clock.advance_secs(12);
        let snapshot = controller.on_visibility_restored();
        assert_eq!(snapshot.phase_name, "Sprint");
        assert_eq!(snapshot.remaining_seconds, 3);
        controller.stop();
    }
}
