//! Routine and segment records as served by the routine catalog.

use serde::{Deserialize, Serialize};

/// One timed phase of a routine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Segment {
    pub phase: String,
    /// Whole seconds, always positive once the catalog has validated it.
    pub duration: u64,
    #[serde(default)]
    pub instruction: String,
    #[serde(default)]
    pub color: String,
}

impl Segment {
    pub fn new(phase: impl Into<String>, duration: u64) -> Self {
        Self {
            phase: phase.into(),
            duration,
            instruction: String::new(),
            color: String::new(),
        }
    }
}

/// Ordered playback of segments plus catalog metadata. Segment order is
/// playback order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Routine {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_intensity")]
    pub intensity: String,
    pub segments: Vec<Segment>,
}

fn default_intensity() -> String {
    "medium".into()
}

impl Routine {
    pub fn total_duration_secs(&self) -> u64 {
        crate::timer::index::total_duration(&self.segments)
    }

    pub fn total_minutes(&self) -> u64 {
        self.total_duration_secs() / 60
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }
}
