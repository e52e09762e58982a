use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rodio::Source;
use std::time::Duration;

/// Near-silent white noise. Some audio stacks suspend an output that only
/// carries digital zeros, so the stream carries a dither far below hearing.
pub struct Dither {
    sample_rate: u32,
    amplitude: f32,
    rng: StdRng,
}

impl Dither {
    pub fn new() -> Self {
        Self {
            sample_rate: 8000,
            amplitude: 1.0e-4,
            rng: StdRng::from_entropy(),
        }
    }
}

impl Default for Dither {
    fn default() -> Self {
        Self::new()
    }
}

impl Iterator for Dither {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.rng.gen_range(-1.0..1.0) * self.amplitude)
    }
}

impl Source for Dither {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        1
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}
