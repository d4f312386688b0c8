//! Bounded exponential backoff for transient HTTP failures.
//!
//! Pure policy: callers ask for the next delay and do the sleeping
//! themselves, so the same policy serves the transport client and the
//! moderation classifiers.

use std::time::Duration;

/// Retry policy for connection errors, 5xx and 429 responses.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Total attempts, including the first. Never retried indefinitely.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base: Duration,
    /// Ceiling for any single delay.
    pub cap: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base: Duration::from_millis(500),
            cap: Duration::from_secs(20),
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `attempt` (1-based: the delay after the
    /// first failure is `delay(1)`). Doubles each attempt, capped.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let d = self.base.saturating_mul(1u32 << exp);
        d.min(self.cap)
    }

    /// Whether another retry is allowed after `attempt` failures.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay for a 429: a server-supplied `Retry-After` (seconds) wins over
    /// the computed backoff, still subject to the cap.
    pub fn delay_with_hint(&self, attempt: u32, retry_after_secs: Option<u64>) -> Duration {
        match retry_after_secs {
            Some(secs) => Duration::from_secs(secs).min(self.cap),
            None => self.delay(attempt),
        }
    }
}

/// Parse a numeric `Retry-After` header value. Malformed values (including
/// HTTP-dates) fall back to the computed backoff.
pub fn parse_retry_after(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok()
}
