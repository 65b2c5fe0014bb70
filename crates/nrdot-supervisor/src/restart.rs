// Copyright The NRDOT-HOST Authors
// SPDX-License-Identifier: Apache-2.0

//! Restart policy: whether a crashed/unhealthy collector should be
//! restarted at all, and the exponential-backoff delay before the next
//! attempt.

use std::time::Duration;

/// When the supervisor restarts a failed or unhealthy collector instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestartPolicy {
    /// Never restart; a failed instance stays down.
    Never,
    /// Restart only after an unhealthy/crashed exit, not a clean
    /// `terminated` one.
    #[default]
    OnFailure,
    /// Always restart regardless of exit cause.
    Always,
}

impl RestartPolicy {
    /// Whether this policy calls for a restart given `was_failure` (`true`
    /// for any exit cause other than a supervisor-initiated `Terminated`).
    #[must_use]
    pub fn should_restart(self, was_failure: bool) -> bool {
        match self {
            Self::Never => false,
            Self::OnFailure => was_failure,
            Self::Always => true,
        }
    }
}

/// Exponential backoff parameters.
#[derive(Debug, Clone, Copy)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    pub initial: Duration,
    /// Ceiling the delay never exceeds.
    pub max: Duration,
    /// Growth factor applied per successive attempt.
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(5 * 60),
            multiplier: 2.0,
        }
    }
}

impl BackoffConfig {
    /// The delay before the `attempt`-th retry (1-indexed: `attempt == 1`
    /// is the first retry, which waits `initial`).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = (attempt - 1) as f64;
        let scaled = self.initial.as_secs_f64() * self.multiplier.powf(exponent);
        Duration::from_secs_f64(scaled.min(self.max.as_secs_f64()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_then_caps_at_max() {
        let backoff = BackoffConfig {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(10),
            multiplier: 2.0,
        };
        assert_eq!(backoff.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(backoff.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(backoff.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(backoff.delay_for_attempt(4), Duration::from_secs(8));
        assert_eq!(backoff.delay_for_attempt(5), Duration::from_secs(10));
        assert_eq!(backoff.delay_for_attempt(10), Duration::from_secs(10));
    }

    #[test]
    fn on_failure_policy_ignores_clean_exits() {
        assert!(!RestartPolicy::OnFailure.should_restart(false));
        assert!(RestartPolicy::OnFailure.should_restart(true));
    }

    #[test]
    fn always_policy_restarts_even_clean_exits() {
        assert!(RestartPolicy::Always.should_restart(false));
    }

    #[test]
    fn never_policy_never_restarts() {
        assert!(!RestartPolicy::Never.should_restart(true));
    }
}
