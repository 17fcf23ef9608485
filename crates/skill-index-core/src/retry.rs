//! Retry budget and exponential backoff schedule for embedding batches.

use std::time::Duration;

/// Number of attempts per batch and the delay between them.
///
/// Attempt 1 fires immediately. Attempt `k > 1` waits
/// `base_delay * 2^(k-2)`: one `base_delay` before attempt 2, two before
/// attempt 3, four before attempt 4, and so on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, base_delay: Duration) -> Self {
        Self {
            attempts,
            base_delay,
        }
    }

    /// Attempt budget, never less than one.
    pub fn max_attempts(&self) -> u32 {
        self.attempts.max(1)
    }

    /// Delay to wait before the given 1-indexed attempt.
    ///
    /// Returns `None` for the first attempt.
    pub fn delay_before(&self, attempt: u32) -> Option<Duration> {
        if attempt <= 1 {
            return None;
        }
        let factor = 2u32.saturating_pow(attempt - 2);
        Some(self.base_delay.saturating_mul(factor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_attempt_is_immediate() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_before(0), None);
        assert_eq!(policy.delay_before(1), None);
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100));
        assert_eq!(policy.delay_before(2), Some(Duration::from_millis(100)));
        assert_eq!(policy.delay_before(3), Some(Duration::from_millis(200)));
        assert_eq!(policy.delay_before(4), Some(Duration::from_millis(400)));
        assert_eq!(policy.delay_before(5), Some(Duration::from_millis(800)));
    }

    #[test]
    fn test_backoff_saturates() {
        let policy = RetryPolicy::new(100, Duration::from_secs(1));
        assert_eq!(policy.delay_before(80), Some(Duration::from_secs(u32::MAX as u64)));
    }

    #[test]
    fn test_zero_attempts_still_tries_once() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts(), 1);
    }
}
