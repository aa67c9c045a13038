//! Property-based tests for the retry policy.

use std::time::Duration;

use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;

use super::retry::{RetryPolicy, jittered};

fn policy_strategy() -> impl Strategy<Value = RetryPolicy> {
    (1u32..10, 1u64..500, 0u64..5_000).prop_map(|(attempts, base, extra)| RetryPolicy {
        max_attempts: attempts,
        base_delay: Duration::from_millis(base),
        max_delay: Duration::from_millis(base + extra),
        jitter: false,
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Delays never shrink from one attempt to the next.
    #[test]
    fn prop_delays_non_decreasing(policy in policy_strategy(), attempt in 1u32..40) {
        prop_assert!(policy.delay_for(attempt) <= policy.delay_for(attempt + 1));
    }

    /// Delays never exceed the cap, and the first equals the base.
    #[test]
    fn prop_delays_capped(policy in policy_strategy(), attempt in 1u32..100) {
        prop_assert!(policy.delay_for(attempt) <= policy.max_delay);
        prop_assert_eq!(policy.delay_for(1), policy.base_delay);
    }

    /// Jitter stays within half of the delay and the delay itself.
    #[test]
    fn prop_jitter_within_bounds(millis in 0u64..10_000, seed in any::<u64>()) {
        let delay = Duration::from_millis(millis);
        let mut rng = StdRng::seed_from_u64(seed);
        let drawn = jittered(delay, &mut rng);
        prop_assert!(drawn <= delay);
        prop_assert!(drawn >= delay / 2);
    }

    /// Without jitter the backoff is exactly the computed delay.
    #[test]
    fn prop_backoff_without_jitter_is_exact(policy in policy_strategy(), attempt in 1u32..20) {
        prop_assert_eq!(policy.backoff(attempt), policy.delay_for(attempt));
    }
}
