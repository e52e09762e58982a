pub mod clock;
pub mod commands;
pub mod controller;
pub mod engine;
pub mod index;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use controller::TimerController;
pub use engine::{Announce, DisplayGuard, HistorySink, WorkoutEngine, WorkoutSnapshot};
pub use index::{locate, total_duration, Position};
pub use state::{Session, SessionStatus};
