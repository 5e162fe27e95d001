//! Exponential backoff with jitter for transient producer failures

use std::time::Duration;

use contracts::ContractError;
use rand::Rng;

/// Default attempt budget, first try included
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default delay before the first retry
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;

/// Default cap on a single delay
pub const DEFAULT_MAX_DELAY_MS: u64 = 60_000;

/// Retry budget and delay curve
///
/// Only [`ContractError::TransientProducer`] failures are retried.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Add up to half the backoff at random
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Backoff before retry number `retry` (0-based), without jitter
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32 << retry.min(16);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Delay after the `attempt`-th failure (1-based), or `None` to give up
    pub fn on_failure(&self, attempt: u32, error: &ContractError) -> Option<Duration> {
        if !error.is_transient() || attempt >= self.max_attempts {
            return None;
        }
        let backoff = self.backoff(attempt - 1);
        if !self.jitter {
            return Some(backoff);
        }
        let spread = backoff.as_millis() as u64 / 2;
        let extra = rand::rng().random_range(0..=spread);
        Some(backoff + Duration::from_millis(extra))
    }

    /// Error to surface once retrying stopped
    pub fn give_up(&self, attempts: u32, error: ContractError) -> ContractError {
        if error.is_transient() {
            ContractError::RetriesExhausted {
                attempts,
                message: error.to_string(),
            }
        } else {
            error
        }
    }
}
