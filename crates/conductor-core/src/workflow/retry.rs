//! Retry policy for failed task attempts.
//!
//! Stateless: every decision is a function of the task's `max_retries`, the
//! zero-based attempt that just failed, and the engine's backoff settings.
//! Backoff is exponential (`unit * 2^attempt`) with no jitter so that test
//! timing stays deterministic.

use std::time::Duration;

use conductor_types::config::BackoffConfig;

// ---------------------------------------------------------------------------
// RetryHandler
// ---------------------------------------------------------------------------

/// Stateless retry decisions, all logic lives in associated functions.
pub struct RetryHandler;

impl RetryHandler {
    /// Total attempts a task may make: the first run plus `max_retries`.
    pub fn total_attempts(max_retries: u32) -> u32 {
        max_retries.saturating_add(1)
    }

    /// Whether another attempt follows a failure of `attempt` (zero-based).
    pub fn should_retry(max_retries: u32, attempt: u32) -> bool {
        attempt < max_retries
    }

    /// Delay before the attempt that follows failed `attempt` (zero-based).
    ///
    /// Attempt 0 waits one unit, attempt 1 two units, attempt 2 four units,
    /// and so on. Saturates instead of overflowing and honours `max_ms`.
    pub fn backoff(config: &BackoffConfig, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        let mut delay_ms = config.unit_ms.saturating_mul(factor);
        if let Some(cap) = config.max_ms {
            delay_ms = delay_ms.min(cap);
        }
        Duration::from_millis(delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seconds() -> BackoffConfig {
        BackoffConfig {
            unit_ms: 1000,
            max_ms: None,
        }
    }

    #[test]
    fn test_total_attempts() {
        assert_eq!(RetryHandler::total_attempts(0), 1);
        assert_eq!(RetryHandler::total_attempts(3), 4);
        assert_eq!(RetryHandler::total_attempts(u32::MAX), u32::MAX);
    }

    #[test]
    fn test_should_retry_under_budget() {
        assert!(RetryHandler::should_retry(3, 0));
        assert!(RetryHandler::should_retry(3, 2));
    }

    #[test]
    fn test_should_retry_budget_exhausted() {
        assert!(!RetryHandler::should_retry(3, 3));
        assert!(!RetryHandler::should_retry(0, 0));
    }

    #[test]
    fn test_backoff_doubles_per_attempt() {
        let cfg = seconds();
        assert_eq!(RetryHandler::backoff(&cfg, 0), Duration::from_secs(1));
        assert_eq!(RetryHandler::backoff(&cfg, 1), Duration::from_secs(2));
        assert_eq!(RetryHandler::backoff(&cfg, 2), Duration::from_secs(4));
        assert_eq!(RetryHandler::backoff(&cfg, 5), Duration::from_secs(32));
    }

    #[test]
    fn test_backoff_respects_cap() {
        let cfg = BackoffConfig {
            unit_ms: 1000,
            max_ms: Some(3000),
        };
        assert_eq!(RetryHandler::backoff(&cfg, 1), Duration::from_secs(2));
        assert_eq!(RetryHandler::backoff(&cfg, 2), Duration::from_secs(3));
    }

    #[test]
    fn test_backoff_saturates_on_huge_attempts() {
        let cfg = seconds();
        assert_eq!(
            RetryHandler::backoff(&cfg, 200),
            Duration::from_millis(u64::MAX)
        );
    }

    #[test]
    fn test_zero_unit_disables_waiting() {
        let cfg = BackoffConfig {
            unit_ms: 0,
            max_ms: None,
        };
        assert_eq!(RetryHandler::backoff(&cfg, 4), Duration::ZERO);
    }
}
