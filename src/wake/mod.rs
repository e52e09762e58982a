//! Keeps the display awake for the duration of a running workout.
//!
//! A primary lease (an OS inhibitor) is paired with an optional fallback
//! that is engaged alongside it on hosts where the inhibitor is unreliable.
//! Both are acquired and released together.

pub mod inhibit;

use anyhow::Result;

use crate::timer::DisplayGuard;

pub use inhibit::InhibitorLock;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Source of primary wake leases.
pub trait WakeLockProvider: Send {
    fn request(&mut self) -> Result<Box<dyn WakeLease>>;
}

/// A granted wake lease. The host may revoke it at any time.
pub trait WakeLease: Send {
    /// False once the host has revoked the lease.
    fn is_active(&mut self) -> bool;
    fn release(self: Box<Self>) -> Result<()>;
}

/// Secondary keep-awake mechanism.
pub trait KeepAwakeFallback: Send {
    fn enable(&mut self) -> Result<()>;
    fn disable(&mut self);
}

pub struct WakeGuard {
    primary: Option<Box<dyn WakeLockProvider>>,
    fallback: Option<Box<dyn KeepAwakeFallback>>,
    lease: Option<Box<dyn WakeLease>>,
    fallback_engaged: bool,
}

impl WakeGuard {
    pub fn new(
        primary: Option<Box<dyn WakeLockProvider>>,
        fallback: Option<Box<dyn KeepAwakeFallback>>,
    ) -> Self {
        if primary.is_none() && fallback.is_none() {
            log_warn!("no wake mechanism available; display may sleep during workouts");
        }
        Self {
            primary,
            fallback,
            lease: None,
            fallback_engaged: false,
        }
    }

    pub fn fallback_engaged(&self) -> bool {
        self.fallback_engaged
    }

    fn engage_fallback(&mut self) {
        if self.fallback_engaged {
            return;
        }
        if let Some(fallback) = self.fallback.as_mut() {
            match fallback.enable() {
                Ok(()) => {
                    self.fallback_engaged = true;
                    log_info!("keep-awake fallback engaged");
                }
                Err(err) => log_warn!("keep-awake fallback unavailable: {err:#}"),
            }
        }
    }

    fn request_lease(&mut self) {
        let Some(primary) = self.primary.as_mut() else {
            return;
        };
        match primary.request() {
            Ok(lease) => {
                self.lease = Some(lease);
                log_info!("wake lock acquired");
            }
            Err(err) => log_warn!("wake lock unavailable: {err:#}"),
        }
    }
}

impl DisplayGuard for WakeGuard {
    fn acquire(&mut self) {
        self.engage_fallback();
        if self.lease.is_some() && self.is_held() {
            return;
        }
        self.request_lease();
    }

    fn release(&mut self) {
        if let Some(lease) = self.lease.take() {
            match lease.release() {
                Ok(()) => log_info!("wake lock released"),
                Err(err) => log_warn!("failed to release wake lock: {err:#}"),
            }
        }
        if self.fallback_engaged {
            if let Some(fallback) = self.fallback.as_mut() {
                fallback.disable();
            }
            self.fallback_engaged = false;
        }
    }

    /// With a primary mechanism, held means an unrevoked lease. Without one,
    /// held means the fallback is engaged.
    fn is_held(&mut self) -> bool {
        if self.primary.is_none() {
            return self.fallback_engaged;
        }
        let revoked = match self.lease.as_mut() {
            Some(lease) => !lease.is_active(),
            None => return false,
        };
        if revoked {
            log_info!("wake lock revoked by host");
            self.lease = None;
            return false;
        }
        true
    }
}

impl Drop for WakeGuard {
    fn drop(&mut self) {
        self.release();
    }
}
