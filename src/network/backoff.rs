//! Reconnect backoff: `min(base * 2^attempt, cap) + jitter`.

use std::time::Duration;

use rand::{Rng, RngCore};

/// Backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first retry, before jitter.
    pub base: Duration,
    /// Ceiling for the exponential part.
    pub cap: Duration,
    /// Upper bound (inclusive) of the random extra delay.
    pub max_jitter: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(1_000),
            cap: Duration::from_millis(30_000),
            max_jitter: Duration::from_millis(1_000),
        }
    }
}

impl ReconnectPolicy {
    /// Deterministic part of the delay for `attempt` (0-based).
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base.as_millis() as u64;
        let cap_ms = self.cap.as_millis() as u64;
        let scaled = 2u64
            .checked_pow(attempt)
            .map_or(u64::MAX, |factor| base_ms.saturating_mul(factor));
        Duration::from_millis(scaled.min(cap_ms))
    }

    /// Full delay for `attempt` including jitter.
    pub fn delay(&self, attempt: u32, rng: &mut impl RngCore) -> Duration {
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rng.gen_range(0..=jitter_ms)
        };
        self.base_delay(attempt) + Duration::from_millis(jitter)
    }
}

/// Attempt counter driving a [`ReconnectPolicy`].
#[derive(Debug, Clone, Default)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempt: u32,
}

impl Backoff {
    /// Start at attempt 0.
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Delay before the next reconnect; advances the attempt counter.
    pub fn next_delay(&mut self, rng: &mut impl RngCore) -> Duration {
        let delay = self.policy.delay(self.attempt, rng);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Connection opened; start over from the base delay.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Failed attempts since the last successful open.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Policy in use.
    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_base_delays() {
        let policy = ReconnectPolicy::default();
        let ms: Vec<u64> = (0..7).map(|a| policy.base_delay(a).as_millis() as u64).collect();
        assert_eq!(ms, vec![1_000, 2_000, 4_000, 8_000, 16_000, 30_000, 30_000]);
        assert_eq!(policy.base_delay(u32::MAX), Duration::from_millis(30_000));
    }

    #[test]
    fn test_jitter_bounds() {
        let policy = ReconnectPolicy::default();
        let mut rng = StdRng::seed_from_u64(7);
        for attempt in 0..10 {
            let base = policy.base_delay(attempt);
            let delay = policy.delay(attempt, &mut rng);
            assert!(delay >= base);
            assert!(delay <= base + Duration::from_millis(1_000));
        }
    }

    #[test]
    fn test_reset_returns_to_base() {
        let policy = ReconnectPolicy {
            max_jitter: Duration::ZERO,
            ..ReconnectPolicy::default()
        };
        let mut backoff = Backoff::new(policy);
        let mut rng = StdRng::seed_from_u64(1);

        assert_eq!(backoff.next_delay(&mut rng), Duration::from_millis(1_000));
        assert_eq!(backoff.next_delay(&mut rng), Duration::from_millis(2_000));
        assert_eq!(backoff.next_delay(&mut rng), Duration::from_millis(4_000));
        assert_eq!(backoff.attempt(), 3);

        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.next_delay(&mut rng), Duration::from_millis(1_000));
    }

    proptest! {
        #[test]
        fn prop_base_delay_monotonic(a in 0u32..200, b in 0u32..200) {
            let policy = ReconnectPolicy::default();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(policy.base_delay(lo) <= policy.base_delay(hi));
            prop_assert!(policy.base_delay(hi) <= policy.cap);
        }

        #[test]
        fn prop_delay_within_jitter(attempt in 0u32..64, seed in any::<u64>()) {
            let policy = ReconnectPolicy::default();
            let mut rng = StdRng::seed_from_u64(seed);
            let delay = policy.delay(attempt, &mut rng);
            let base = policy.base_delay(attempt);
            prop_assert!(delay >= base && delay <= base + policy.max_jitter);
        }
    }
}
