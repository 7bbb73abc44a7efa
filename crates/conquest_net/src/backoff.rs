//! Bounded exponential retry schedule.
//!
//! Used for outbound sends and reconnect attempts. Delays double from a
//! base up to a cap, and the attempt count is bounded, so a dead peer
//! costs a fixed amount of waiting before the failure surfaces.

use std::time::Duration;

/// Retry schedule with exponential delays and a hard attempt limit.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    max_attempts: u32,
    attempt: u32,
}

impl Backoff {
    /// Create a schedule starting at `base`, doubling up to `cap`, with
    /// at most `max_attempts` retries.
    #[must_use]
    pub const fn new(base: Duration, cap: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            cap,
            max_attempts,
            attempt: 0,
        }
    }

    /// Attempts consumed so far.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempt
    }

    /// The delay before the next retry, or `None` once the attempt
    /// budget is spent. Consumes one attempt.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_attempts {
            return None;
        }
        let exp = self.attempt.min(16);
        self.attempt += 1;
        let delay = self.base.saturating_mul(1u32 << exp);
        Some(delay.min(self.cap))
    }

    /// Forget past failures after a success.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(250), Duration::from_secs(4), 5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_double_up_to_cap() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(500), 6);
        let delays: Vec<u64> = std::iter::from_fn(|| backoff.next_delay())
            .map(|d| u64::try_from(d.as_millis()).unwrap())
            .collect();
        assert_eq!(delays, vec![100, 200, 400, 500, 500, 500]);
    }

    #[test]
    fn test_attempts_are_bounded() {
        let mut backoff = Backoff::new(Duration::from_millis(10), Duration::from_millis(100), 3);
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_none());
        assert!(backoff.next_delay().is_none());
        assert_eq!(backoff.attempts(), 3);
    }

    #[test]
    fn test_reset_restores_budget() {
        let mut backoff = Backoff::new(Duration::from_millis(10), Duration::from_millis(100), 2);
        backoff.next_delay();
        backoff.next_delay();
        assert!(backoff.next_delay().is_none());

        backoff.reset();
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(10)));
    }

    #[test]
    fn test_total_wait_is_finite() {
        let mut backoff = Backoff::default();
        let total: Duration = std::iter::from_fn(|| backoff.next_delay()).sum();
        assert!(total < Duration::from_secs(30));
    }
}
