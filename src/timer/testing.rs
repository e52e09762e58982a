//! Recording stand-ins for the engine's side-effect seams.

use std::sync::{Arc, Mutex};

use chrono::NaiveDate;

use super::engine::{Announce, DisplayGuard, HistorySink};

#[derive(Default)]
pub struct RecordingAnnouncer {
    pub spoken: Mutex<Vec<String>>,
    pub cancels: Mutex<usize>,
    pub primes: Mutex<usize>,
    pub host_resumes: Mutex<usize>,
}

impl RecordingAnnouncer {
    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }

    pub fn count(&self, text: &str) -> usize {
        self.spoken().iter().filter(|s| s.as_str() == text).count()
    }
}

impl Announce for RecordingAnnouncer {
    fn prime_for_user_gesture(&self) {
        *self.primes.lock().unwrap() += 1;
    }
    fn announce(&self, text: &str) {
        self.spoken.lock().unwrap().push(text.to_string());
    }
    fn cancel(&self) {
        *self.cancels.lock().unwrap() += 1;
    }
    fn resume_host(&self) {
        *self.host_resumes.lock().unwrap() += 1;
    }
}

#[derive(Default)]
pub struct GuardLog {
    pub held: bool,
    pub acquires: usize,
    pub releases: usize,
    pub revoked: bool,
}

#[derive(Clone, Default)]
pub struct FakeGuard(pub Arc<Mutex<GuardLog>>);

impl DisplayGuard for FakeGuard {
    fn acquire(&mut self) {
        let mut log = self.0.lock().unwrap();
        log.acquires += 1;
        log.held = true;
        log.revoked = false;
    }
    fn release(&mut self) {
        let mut log = self.0.lock().unwrap();
        log.releases += 1;
        log.held = false;
    }
    fn is_held(&mut self) -> bool {
        let log = self.0.lock().unwrap();
        log.held && !log.revoked
    }
}

#[derive(Default)]
pub struct CountingHistory {
    pub writes: Mutex<Vec<String>>,
}

impl HistorySink for CountingHistory {
    fn record_completion(&self, routine_id: &str, _completed_on: NaiveDate) {
        self.writes.lock().unwrap().push(routine_id.to_string());
    }
}
