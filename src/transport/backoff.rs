//! Pure reconnection backoff calculation
//!
//! Delays double with every attempt and saturate at a cap. Nothing in this
//! module performs I/O, so the schedule can be tested in isolation.

use std::time::Duration;

/// Default delay before the first reconnection attempt
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(1000);

/// Default ceiling for the reconnection delay
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(30_000);

/// Compute the delay before reconnection attempt `attempt` (0-based).
///
/// Attempt 0 waits `initial`; every following attempt doubles the previous
/// delay until it reaches `cap`, after which `cap` is returned forever.
/// An `initial` larger than `cap` yields `cap`.
pub fn delay(attempt: u32, initial: Duration, cap: Duration) -> Duration {
    let mut current = initial.min(cap);
    for _ in 0..attempt {
        if current >= cap || current.is_zero() {
            break;
        }
        current = current.saturating_mul(2).min(cap);
    }
    current
}

/// Reconnection backoff settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay before the first attempt of an episode
    pub initial: Duration,
    /// Upper bound for any single delay
    pub cap: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: DEFAULT_INITIAL_DELAY,
            cap: DEFAULT_MAX_DELAY,
        }
    }
}

impl BackoffPolicy {
    pub fn new(initial: Duration, cap: Duration) -> Self {
        Self { initial, cap }
    }

    /// Delay for the given 0-based attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        delay(attempt, self.initial, self.cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_policy() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.initial, Duration::from_millis(1000));
        assert_eq!(policy.cap, Duration::from_secs(30));
    }

    #[test]
    fn test_default_schedule() {
        let policy = BackoffPolicy::default();
        let expected_ms = [1000, 2000, 4000, 8000, 16000, 30000, 30000];

        for (attempt, expected) in expected_ms.iter().enumerate() {
            assert_eq!(
                policy.delay_for(attempt as u32),
                Duration::from_millis(*expected),
                "attempt {attempt}"
            );
        }
    }

    #[test]
    fn test_saturates_for_huge_attempts() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_initial_larger_than_cap() {
        let result = delay(0, Duration::from_secs(60), Duration::from_secs(30));
        assert_eq!(result, Duration::from_secs(30));
    }

    #[test]
    fn test_zero_initial_stays_zero() {
        for attempt in 0..10 {
            assert_eq!(
                delay(attempt, Duration::ZERO, Duration::from_secs(30)),
                Duration::ZERO
            );
        }
    }

    #[test]
    fn test_zero_initial_returns_at_once_for_huge_attempts() {
        let start = std::time::Instant::now();

        let result = delay(u32::MAX, Duration::ZERO, Duration::from_secs(30));

        assert_eq!(result, Duration::ZERO);
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    proptest! {
        #[test]
        fn delay_never_exceeds_cap(
            attempt in 0u32..10_000,
            initial_ms in 0u64..100_000,
            cap_ms in 0u64..100_000,
        ) {
            let cap = Duration::from_millis(cap_ms);
            let result = delay(attempt, Duration::from_millis(initial_ms), cap);
            prop_assert!(result <= cap);
        }

        #[test]
        fn delay_is_monotonic(attempt in 0u32..1_000, initial_ms in 1u64..10_000) {
            let initial = Duration::from_millis(initial_ms);
            let cap = Duration::from_secs(30);
            prop_assert!(delay(attempt, initial, cap) <= delay(attempt + 1, initial, cap));
        }
    }
}
