//! Consecutive-failure lockout bookkeeping for password sign-in.

use chrono::{DateTime, Duration, Utc};

use crate::config::AuthThrottleConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    pub max_attempts: u32,
    pub duration: Duration,
}

/// Persisted per identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LockoutState {
    pub failed_count: u32,
    pub lockout_end: Option<DateTime<Utc>>,
}

impl LockoutPolicy {
    #[must_use]
    pub fn from_config(config: &AuthThrottleConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            duration: Duration::seconds(i64::try_from(config.lockout_seconds).unwrap_or(i64::MAX)),
        }
    }

    #[must_use]
    pub fn is_locked(&self, state: &LockoutState, now: DateTime<Utc>) -> bool {
        state.lockout_end.is_some_and(|end| end > now)
    }

    /// Whether a counter that has just reached `failed_count` starts a
    /// lockout window. The store resets the counter when it does.
    #[must_use]
    pub const fn trips(&self, failed_count: u32) -> bool {
        failed_count >= self.max_attempts
    }

    #[must_use]
    pub fn window_end(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_add_signed(self.duration)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    #[must_use]
    pub const fn record_success(&self) -> LockoutState {
        LockoutState {
            failed_count: 0,
            lockout_end: None,
        }
    }
}
