//! PIN gate in front of the dashboard. A correct PIN is remembered for a
//! week; the engine itself never looks at any of this.

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::settings::{AuthState, SettingsStore};

pub const PIN_EXPIRY_DAYS: i64 = 7;
pub const MAX_PIN_LEN: usize = 4;
const DEFAULT_PIN: &str = "1234";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid PIN. Try again.")]
    InvalidPin,
    #[error("Could not save login: {0}")]
    Storage(String),
}

pub struct AuthGate {
    pin: String,
}

impl AuthGate {
    pub fn new(pin: impl Into<String>) -> Self {
        Self { pin: pin.into() }
    }

    /// PIN from `APP_PIN`, defaulting to the development PIN.
    pub fn from_env() -> Self {
        Self::new(std::env::var("APP_PIN").unwrap_or_else(|_| DEFAULT_PIN.to_string()))
    }

    pub fn is_authenticated(&self, store: &SettingsStore, now: DateTime<Utc>) -> bool {
        store
            .auth()
            .expiry
            .map(|expiry| expiry > now)
            .unwrap_or(false)
    }

    /// Checks `entered` and on success remembers the login until the expiry.
    pub fn login(
        &self,
        store: &SettingsStore,
        entered: &str,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, AuthError> {
        let entered = entered.trim();
        if entered.is_empty() || entered.chars().count() > MAX_PIN_LEN || entered != self.pin {
            return Err(AuthError::InvalidPin);
        }

        let expiry = now + Duration::days(PIN_EXPIRY_DAYS);
        store
            .update_auth(AuthState {
                expiry: Some(expiry),
            })
            .map_err(|err| AuthError::Storage(format!("{err:#}")))?;
        Ok(expiry)
    }

    pub fn logout(&self, store: &SettingsStore) -> Result<(), AuthError> {
        store
            .update_auth(AuthState::default())
            .map_err(|err| AuthError::Storage(format!("{err:#}")))
    }
}
