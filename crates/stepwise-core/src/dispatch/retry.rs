//! Retry policy for transient agent failures.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::agent::AgentError;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(8);

/// Exponential backoff bounded by `max_delay`, applied to transient
/// failures only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before the attempt following `attempt` (1-based), or `None`
    /// when the error is permanent or the budget is spent.
    pub fn next_delay(&self, attempt: u32, error: &AgentError) -> Option<Duration> {
        if !error.is_transient() || attempt >= self.max_attempts {
            return None;
        }
        Some(error.retry_after().unwrap_or_else(|| self.backoff(attempt)))
    }

    /// `base_delay * 2^(attempt-1)`, capped at `max_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis();
        if base_ms == 0 {
            return Duration::ZERO;
        }
        let max_ms = self.max_delay.as_millis().max(base_ms);
        let shift = attempt.saturating_sub(1).min(20);
        let backoff_ms = base_ms.saturating_mul(1u128 << shift).min(max_ms);
        Duration::from_millis(u64::try_from(backoff_ms).unwrap_or(u64::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_until_cap() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
        assert_eq!(policy.backoff(4), Duration::from_millis(500));
        assert_eq!(policy.backoff(40), Duration::from_millis(500));
    }

    #[test]
    fn test_permanent_errors_never_retry() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.next_delay(1, &AgentError::Auth("denied".into())), None);
    }

    #[test]
    fn test_transient_errors_retry_within_budget() {
        let policy = RetryPolicy::default();
        let err = AgentError::Transient("reset".into());
        assert_eq!(policy.next_delay(1, &err), Some(Duration::from_millis(500)));
        assert_eq!(policy.next_delay(2, &err), Some(Duration::from_secs(1)));
        assert_eq!(policy.next_delay(3, &err), None);
    }

    #[test]
    fn test_rate_limit_delay_wins() {
        let policy = RetryPolicy::default();
        let err = AgentError::RateLimited {
            message: "429".into(),
            retry_after: Some(Duration::from_secs(2)),
        };
        assert_eq!(policy.next_delay(1, &err), Some(Duration::from_secs(2)));
        assert_eq!(RetryPolicy::none().next_delay(1, &err), None);
    }
}
