//! Restart strategies and backoff.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Which children a supervisor restarts after a failure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Restart only the failed child.
    #[default]
    OneForOne,
    /// Restart every child of the supervisor.
    AllForOne,
    /// Hand the failure to the parent supervisor.
    Escalate,
}

/// Restart policy of a supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorStrategy {
    pub kind: StrategyKind,

    /// Failures tolerated per child before it is removed.
    pub max_retries: u32,

    /// Base delay before the first restart.
    pub initial_backoff_ms: u64,

    /// Upper bound on any restart delay.
    pub max_backoff_ms: u64,
}

impl Default for SupervisorStrategy {
    fn default() -> Self {
        Self {
            kind: StrategyKind::OneForOne,
            max_retries: 3,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 10_000,
        }
    }
}

impl SupervisorStrategy {
    pub fn one_for_one() -> Self {
        Self::default()
    }

    pub fn all_for_one() -> Self {
        Self {
            kind: StrategyKind::AllForOne,
            ..Self::default()
        }
    }

    pub fn escalate() -> Self {
        Self {
            kind: StrategyKind::Escalate,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff_ms = u64::try_from(initial.as_millis()).unwrap_or(u64::MAX);
        self.max_backoff_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Delay before restarting a child that has already failed `retries` times.
    pub fn backoff(&self, retries: u32) -> Duration {
        self.backoff_with(retries, &mut rand::rng())
    }

    /// `min(initial * 2^r * jitter, max)` with `r` drawn from `[0, retries]`
    /// and `jitter` from `[0.5, 1.5]`.
    pub fn backoff_with<R: Rng + ?Sized>(&self, retries: u32, rng: &mut R) -> Duration {
        let exponent = rng.random_range(0..=retries).min(63);
        let jitter: f64 = rng.random_range(0.5..=1.5);

        let base = self.initial_backoff_ms as f64 * 2f64.powi(exponent as i32);
        let delay = (base * jitter).clamp(0.0, self.max_backoff_ms as f64);

        Duration::from_millis(delay as u64)
    }
}
