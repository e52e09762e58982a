pub mod command;
pub mod voice;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use anyhow::Result;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::timer::Announce;

pub use command::CommandSpeech;
pub use voice::{select_voice, Voice, VoicePreferences};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub voice: Option<Voice>,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

impl Utterance {
    pub fn new(text: impl Into<String>, voice: Option<Voice>) -> Self {
        Self {
            text: text.into(),
            voice,
            rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
        }
    }

    pub fn silent() -> Self {
        Self {
            volume: 0.0,
            ..Self::new("", None)
        }
    }
}

/// A host speech synthesizer.
pub trait SpeechBackend: Send + Sync {
    /// Voices the host offers. May be empty until the host has loaded them.
    fn voices(&self) -> Vec<Voice>;
    /// Starts speaking without waiting for the utterance to finish.
    fn speak(&self, utterance: &Utterance) -> Result<()>;
    /// Stops whatever is being spoken. No-op when silent.
    fn cancel(&self);
    /// Continues an utterance the host suspended.
    fn resume(&self) {}
}

struct Pending {
    token: Option<CancellationToken>,
}

/// Serializes spoken cues: every `announce` cancels the previous one, waits a
/// short settle delay and then speaks. The last call wins.
pub struct Announcer {
    backend: Option<Arc<dyn SpeechBackend>>,
    runtime: Option<Handle>,
    settle: Duration,
    prefs: VoicePreferences,
    pending: Arc<Mutex<Pending>>,
    voice: Mutex<Option<Voice>>,
    primed: AtomicBool,
}

impl Announcer {
    pub fn new(backend: Arc<dyn SpeechBackend>, prefs: VoicePreferences, settle: Duration) -> Self {
        let runtime = Handle::try_current().ok();
        if runtime.is_none() {
            log_warn!("announcer created outside a tokio runtime; cues will skip the settle delay");
        }
        Self {
            backend: Some(backend),
            runtime,
            settle,
            prefs,
            pending: Arc::new(Mutex::new(Pending { token: None })),
            voice: Mutex::new(None),
            primed: AtomicBool::new(false),
        }
    }

    /// Announcer for hosts without speech. Every call is a no-op.
    pub fn disabled() -> Self {
        Self {
            backend: None,
            runtime: None,
            settle: DEFAULT_SETTLE_DELAY,
            prefs: VoicePreferences::default(),
            pending: Arc::new(Mutex::new(Pending { token: None })),
            voice: Mutex::new(None),
            primed: AtomicBool::new(false),
        }
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    pub fn selected_voice(&self) -> Option<Voice> {
        self.voice.lock().ok().and_then(|guard| guard.clone())
    }

    /// Runs the preference ladder if no voice has been picked yet. Returns
    /// false while the host still reports no voices.
    pub fn refresh_voice(&self) -> bool {
        let Some(backend) = self.backend.as_ref() else {
            return false;
        };
        let Ok(mut guard) = self.voice.lock() else {
            return false;
        };
        if guard.is_some() {
            return true;
        }

        let voices = backend.voices();
        if voices.is_empty() {
            return false;
        }
        *guard = select_voice(&voices, &self.prefs);
        match guard.as_ref() {
            Some(voice) => log_info!("selected voice {} ({})", voice.name, voice.lang),
            None => log_info!("no voice matched; using host default"),
        }
        true
    }

    fn cancel_pending(&self, pending: &mut Pending) {
        if let Some(token) = pending.token.take() {
            token.cancel();
        }
        if let Some(backend) = self.backend.as_ref() {
            backend.cancel();
        }
    }
}

impl Announce for Announcer {
    fn prime_for_user_gesture(&self) {
        let Some(backend) = self.backend.as_ref() else {
            return;
        };
        if self.primed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.refresh_voice();
        match backend.speak(&Utterance::silent()) {
            Ok(()) => log_info!("speech primed"),
            Err(err) => log_warn!("speech priming failed: {err:#}"),
        }
    }

    fn announce(&self, text: &str) {
        let Some(backend) = self.backend.clone() else {
            return;
        };
        self.refresh_voice();
        let utterance = Utterance::new(text, self.selected_voice());

        let Ok(mut pending) = self.pending.lock() else {
            log_error!("announcer state poisoned; dropping cue {text:?}");
            return;
        };
        self.cancel_pending(&mut pending);

        let Some(runtime) = self.runtime.as_ref() else {
            if let Err(err) = backend.speak(&utterance) {
                log_error!("speech failed: {err:#}");
            }
            return;
        };

        let token = CancellationToken::new();
        pending.token = Some(token.clone());
        drop(pending);

        let shared = Arc::clone(&self.pending);
        let settle = self.settle;
        runtime.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(settle) => {
                    // Checked under the lock so a concurrent cancel either
                    // wins outright or sees this utterance as speaking.
                    let Ok(mut pending) = shared.lock() else {
                        return;
                    };
                    if token.is_cancelled() {
                        return;
                    }
                    if let Err(err) = backend.speak(&utterance) {
                        log_error!("speech failed: {err:#}");
                    }
                    pending.token = None;
                }
            }
        });
    }

    fn cancel(&self) {
        if let Ok(mut pending) = self.pending.lock() {
            self.cancel_pending(&mut pending);
        }
    }

    fn resume_host(&self) {
        if let Some(backend) = self.backend.as_ref() {
            backend.resume();
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{Call, RecordingBackend};
    use super::*;

    fn announcer(backend: Arc<RecordingBackend>) -> Announcer {
        Announcer::new(backend, VoicePreferences::default(), DEFAULT_SETTLE_DELAY)
    }

    #[tokio::test(start_paused = true)]
    async fn later_announcement_replaces_pending_one() {
        let backend = Arc::new(RecordingBackend::default());
        let announcer = announcer(backend.clone());

        announcer.announce("Starting Sprint");
        tokio::time::sleep(Duration::from_millis(10)).await;
        announcer.announce("3");
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(backend.spoken(), vec!["3".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_before_settle_drops_the_cue() {
        let backend = Arc::new(RecordingBackend::default());
        let announcer = announcer(backend.clone());

        announcer.announce("Starting Rest");
        announcer.cancel();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(backend.spoken().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn each_announcement_cancels_the_host_first() {
        let backend = Arc::new(RecordingBackend::default());
        let announcer = announcer(backend.clone());

        announcer.announce("Starting Warm-up");
        tokio::time::sleep(Duration::from_millis(100)).await;
        announcer.announce("5");
        tokio::time::sleep(Duration::from_millis(100)).await;

        let calls = backend.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                Call::Cancel,
                Call::Speak("Starting Warm-up".into()),
                Call::Cancel,
                Call::Speak("5".into()),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stopping_a_workout_silences_the_pending_countdown() {
        use crate::models::{Routine, Segment};
        use crate::timer::testing::{CountingHistory, FakeGuard};
        use crate::timer::{ManualClock, WorkoutEngine};

        let backend = Arc::new(RecordingBackend::default());
        let clock = ManualClock::new(0);
        let mut engine = WorkoutEngine::new(
            Arc::new(clock.clone()),
            Arc::new(announcer(backend.clone())),
            Box::new(FakeGuard::default()),
            Arc::new(CountingHistory::default()),
        );
        engine.load(Arc::new(Routine {
            id: "plank".into(),
            title: "Plank".into(),
            description: String::new(),
            intensity: "low".into(),
            segments: vec![Segment::new("Plank", 5)],
        }));

        engine.start();
        clock.advance_secs(2);
        engine.tick();
        engine.stop();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(backend.spoken().is_empty());
    }

    #[tokio::test]
    async fn priming_happens_once() {
        let backend = Arc::new(RecordingBackend::default());
        let announcer = announcer(backend.clone());

        announcer.prime_for_user_gesture();
        announcer.prime_for_user_gesture();

        let calls = backend.calls.lock().unwrap().clone();
        assert_eq!(calls, vec![Call::Speak(String::new())]);
    }

    #[tokio::test]
    async fn voice_is_selected_once_voices_exist() {
        let backend = Arc::new(RecordingBackend {
            voices: vec![
                Voice::new("Alex", "en_US", true),
                Voice::new("Daniel", "en_GB", false),
            ],
            ..Default::default()
        });
        let announcer = announcer(backend);
        assert!(announcer.refresh_voice());
        assert_eq!(announcer.selected_voice().unwrap().name, "Daniel");
    }

    #[test]
    fn disabled_announcer_is_inert() {
        let announcer = Announcer::disabled();
        announcer.prime_for_user_gesture();
        announcer.announce("Starting Sprint");
        announcer.cancel();
        announcer.resume_host();
        assert!(!announcer.is_available());
        assert!(!announcer.refresh_voice());
    }

    #[tokio::test]
    async fn resume_reaches_the_backend() {
        let backend = Arc::new(RecordingBackend::default());
        let announcer = announcer(backend.clone());
        announcer.resume_host();
        assert_eq!(backend.calls.lock().unwrap().as_slice(), [Call::Resume]);
    }
}
