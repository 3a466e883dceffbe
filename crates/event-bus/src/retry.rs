//! Bounded exponential backoff for failing handlers.
//!
//! ```text
//! attempt   delay (initial=200ms)   with jitter (±10%)
//! ─────────────────────────────────────────────────────
//!    1            200ms               180ms - 220ms
//!    2            400ms               360ms - 440ms
//!    3         DEAD LETTER          max attempts reached
//! ```

use std::time::Duration;

use rand::Rng;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(200);
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(5);
const DEFAULT_JITTER_FACTOR: f64 = 0.1;

/// Retry policy applied by consumer workers.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total handler invocations per message, including the first one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Fraction of the delay added or removed at random (0.0 - 1.0).
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }
}

impl RetryPolicy {
    /// A single attempt; failures are dead-lettered immediately.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Retries without waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            jitter_factor: 0.0,
        }
    }

    /// Returns true if another attempt is allowed after `attempt` failed.
    pub fn can_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let raw = self.initial_backoff.saturating_mul(1u32 << exponent);
        let delay = raw.min(self.max_backoff);

        let jitter_range = delay.as_secs_f64() * self.jitter_factor;
        if jitter_range <= 0.0 {
            return delay;
        }
        let jitter = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
        Duration::from_secs_f64((delay.as_secs_f64() + jitter).max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert!(policy.can_retry(1));
        assert!(policy.can_retry(2));
        assert!(!policy.can_retry(3));
    }

    #[test]
    fn test_delay_grows_exponentially_within_jitter() {
        let policy = RetryPolicy::default();
        let first = policy.delay_for(1);
        let second = policy.delay_for(2);
        assert!(first >= Duration::from_millis(180) && first <= Duration::from_millis(220));
        assert!(second >= Duration::from_millis(360) && second <= Duration::from_millis(440));
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = RetryPolicy {
            jitter_factor: 0.0,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for(30), Duration::from_secs(5));
    }

    #[test]
    fn test_no_retry_and_immediate() {
        assert!(!RetryPolicy::no_retry().can_retry(1));
        let immediate = RetryPolicy::immediate(4);
        assert!(immediate.can_retry(3));
        assert_eq!(immediate.delay_for(2), Duration::ZERO);
        assert_eq!(RetryPolicy::immediate(0).max_attempts, 1);
    }
}
