pub mod history;
pub mod routine;

pub use history::HistoryEntry;
pub use routine::{Routine, Segment};
