use serde::{Deserialize, Serialize};
use uuid::Uuid;

use log::warn;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    #[default]
    Idle,
    Running,
    Paused,
    Finished,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "Idle",
            SessionStatus::Running => "Running",
            SessionStatus::Paused => "Paused",
            SessionStatus::Finished => "Finished",
        }
    }

    /// Running or paused: a workout is in progress.
    pub fn is_active(&self) -> bool {
        matches!(self, SessionStatus::Running | SessionStatus::Paused)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub status: SessionStatus,
    /// Clock reading at elapsed = 0, pushed forward by every completed pause.
    pub anchor_ms: i64,
    pub paused_at_ms: Option<i64>,
    pub last_announced_second: Option<u64>,
    pub active_segment_index: usize,
    /// Last elapsed value handed out. Frozen while paused and used as the
    /// floor when the clock moves backward.
    pub last_elapsed_ms: u64,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            status: SessionStatus::Idle,
            anchor_ms: 0,
            paused_at_ms: None,
            last_announced_second: None,
            active_segment_index: 0,
            last_elapsed_ms: 0,
        }
    }
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, now_ms: i64) {
        *self = Self {
            status: SessionStatus::Running,
            anchor_ms: now_ms,
            ..Self::default()
        };
    }

    /// Elapsed workout time as of `now_ms`.
    ///
    /// Only a running session reads the clock; any other status reports the
    /// frozen value. A reading below the previous one is clamped to it.
    pub fn observe_elapsed_ms(&mut self, now_ms: i64) -> u64 {
        if self.status != SessionStatus::Running {
            return self.last_elapsed_ms;
        }

        let raw = now_ms.saturating_sub(self.anchor_ms);
        let raw = u64::try_from(raw).unwrap_or(0);
        if raw < self.last_elapsed_ms {
            warn!(
                "session {}: clock moved backward by {}ms, holding elapsed at {}ms",
                self.id,
                self.last_elapsed_ms - raw,
                self.last_elapsed_ms
            );
            return self.last_elapsed_ms;
        }

        self.last_elapsed_ms = raw;
        raw
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.last_elapsed_ms / 1000
    }

    pub fn pause(&mut self, now_ms: i64) {
        self.observe_elapsed_ms(now_ms);
        self.paused_at_ms = Some(now_ms);
        self.status = SessionStatus::Paused;
    }

    /// Shifts the anchor by the pause length so elapsed continues from where
    /// it stopped.
    pub fn resume(&mut self, now_ms: i64) {
        if let Some(paused_at) = self.paused_at_ms.take() {
            let gap = now_ms.saturating_sub(paused_at).max(0);
            self.anchor_ms = self.anchor_ms.saturating_add(gap);
        }
        self.status = SessionStatus::Running;
    }

    pub fn finish(&mut self) {
        self.status = SessionStatus::Finished;
        self.paused_at_ms = None;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
