//! Maps absolute elapsed seconds onto a routine's segments.

use crate::models::Segment;

/// Where a given elapsed second falls inside a routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position<'a> {
    pub segment: &'a Segment,
    pub index: usize,
    pub offset: u64,
    pub remaining: u64,
}

pub fn total_duration(segments: &[Segment]) -> u64 {
    segments.iter().map(|segment| segment.duration).sum()
}

/// Finds the segment whose `[start, start + duration)` range holds
/// `elapsed_secs`. Returns `None` once the whole routine has elapsed.
///
/// Always walks the prefix sums from the start, so the answer depends only on
/// `elapsed_secs` and never on how often it is called.
pub fn locate(segments: &[Segment], elapsed_secs: u64) -> Option<Position<'_>> {
    let mut start = 0u64;
    for (index, segment) in segments.iter().enumerate() {
        let end = start.saturating_add(segment.duration);
        if elapsed_secs < end {
            let offset = elapsed_secs - start;
            return Some(Position {
                segment,
                index,
                offset,
                remaining: segment.duration - offset,
            });
        }
        start = end;
    }
    None
}
