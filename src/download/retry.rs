use super::error::TransferError;
use std::time::Duration;

/// Attempts and backoff for one task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total transfer attempts, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Added on top of the backoff when the host reports rate limiting
    pub rate_limit_cooldown: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            rate_limit_cooldown: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, rate_limit_cooldown: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            rate_limit_cooldown,
        }
    }

    /// Backoff after failed attempt `attempt` (1-based): base * 2^(attempt - 1)
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay * 2_u32.pow(attempt.saturating_sub(1).min(16))
    }

    /// Delay before the next attempt, or `None` when the task must stop
    pub fn next_delay(&self, attempt: u32, error: &TransferError) -> Option<Duration> {
        if !error.is_retryable() || attempt >= self.max_attempts {
            return None;
        }
        let mut delay = self.backoff(attempt);
        if matches!(error, TransferError::RateLimited(_)) {
            delay += self.rate_limit_cooldown;
        }
        Some(delay)
    }
}
