//! Bounded retry policy for sources waiting on a resource

use crate::types::BackoffType;
use std::time::Duration;

/// How long to wait between attempts, and how many attempts to make
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Type of backoff strategy
    pub backoff_type: BackoffType,
    /// Delay before the first retry
    pub initial_backoff: Duration,
    /// Upper bound for any single delay
    pub max_backoff: Duration,
    /// Give up after this many failed attempts (`None` = until cancelled)
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff_type: BackoffType::Constant,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(1),
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    /// Constant delay, retrying until cancelled
    pub fn constant(delay: Duration) -> Self {
        Self {
            backoff_type: BackoffType::Constant,
            initial_backoff: delay,
            max_backoff: delay,
            max_attempts: None,
        }
    }

    /// Exponential backoff between `initial` and `max`
    pub fn exponential(initial: Duration, max: Duration) -> Self {
        Self {
            backoff_type: BackoffType::Exponential,
            initial_backoff: initial,
            max_backoff: max,
            max_attempts: None,
        }
    }

    /// Limit the number of attempts
    #[must_use]
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Delay to wait after the given failed attempt (0-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let delay = match self.backoff_type {
            BackoffType::Constant => Some(self.initial_backoff),
            BackoffType::Linear => self.initial_backoff.checked_mul(attempt.saturating_add(1)),
            BackoffType::Exponential => {
                let factor = 2u32.saturating_pow(attempt);
                self.initial_backoff.checked_mul(factor)
            }
        };

        delay.map_or(self.max_backoff, |d| d.min(self.max_backoff))
    }

    /// Whether `failed` attempts use up the budget
    pub fn is_exhausted(&self, failed: u32) -> bool {
        self.max_attempts.is_some_and(|max| failed >= max)
    }
}
