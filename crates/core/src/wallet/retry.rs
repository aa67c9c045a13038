//! Backoff policy for optimistic balance updates.

use std::time::Duration;

use rand::Rng;

use purse_shared::WalletConfig;

/// Largest doubling exponent applied to the base delay.
const MAX_BACKOFF_SHIFT: u32 = 20;

/// Capped exponential backoff with optional jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts before giving up with a conflict. Never zero.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub base_delay: Duration,
    /// Upper bound for any delay.
    pub max_delay: Duration,
    /// Randomise each delay within `[delay / 2, delay]`.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&WalletConfig::default())
    }
}

impl From<&WalletConfig> for RetryPolicy {
    fn from(config: &WalletConfig) -> Self {
        let base_delay = Duration::from_millis(config.retry_base_delay_ms);
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay,
            max_delay: Duration::from_millis(config.retry_max_delay_ms).max(base_delay),
            jitter: config.retry_jitter,
        }
    }
}

impl RetryPolicy {
    /// A policy that waits the same `delay` between every attempt.
    #[must_use]
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: delay,
            max_delay: delay,
            jitter: false,
        }
    }

    /// Un-jittered delay after failed attempt `attempt` (1-based).
    ///
    /// `min(base_delay * 2^(attempt - 1), max_delay)`
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(MAX_BACKOFF_SHIFT);
        self.base_delay
            .saturating_mul(1_u32 << shift)
            .min(self.max_delay)
    }

    /// Delay to actually sleep after failed attempt `attempt`.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let delay = self.delay_for(attempt);
        if self.jitter {
            jittered(delay, &mut rand::rng())
        } else {
            delay
        }
    }
}

/// Draws uniformly from `[delay / 2, delay]`.
pub(crate) fn jittered<R: Rng + ?Sized>(delay: Duration, rng: &mut R) -> Duration {
    let upper = u64::try_from(delay.as_micros()).unwrap_or(u64::MAX);
    let lower = upper / 2;
    if upper == 0 {
        return Duration::ZERO;
    }
    Duration::from_micros(rng.random_range(lower..=upper))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            jitter: false,
        }
    }

    #[rstest]
    #[case(1, 100)]
    #[case(2, 200)]
    #[case(3, 400)]
    #[case(4, 800)]
    #[case(5, 1_000)]
    #[case(64, 1_000)]
    fn test_delay_for(#[case] attempt: u32, #[case] millis: u64) {
        assert_eq!(policy().delay_for(attempt), Duration::from_millis(millis));
    }

    #[test]
    fn test_fixed_policy_never_grows() {
        let fixed = RetryPolicy::fixed(3, Duration::from_millis(100));
        assert_eq!(fixed.backoff(1), Duration::from_millis(100));
        assert_eq!(fixed.backoff(3), Duration::from_millis(100));
    }

    #[test]
    fn test_from_config_defaults() {
        let retry = RetryPolicy::from(&WalletConfig::default());
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.base_delay, Duration::from_millis(100));
        assert_eq!(retry.max_delay, Duration::from_secs(1));
        assert!(retry.jitter);
    }

    #[test]
    fn test_from_config_clamps_degenerate_values() {
        let config = WalletConfig {
            max_attempts: 0,
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 10,
            retry_jitter: false,
        };
        let retry = RetryPolicy::from(&config);
        assert_eq!(retry.max_attempts, 1);
        assert_eq!(retry.max_delay, Duration::from_millis(500));
    }

    #[test]
    fn test_jitter_of_zero_is_zero() {
        assert_eq!(jittered(Duration::ZERO, &mut rand::rng()), Duration::ZERO);
    }
}
