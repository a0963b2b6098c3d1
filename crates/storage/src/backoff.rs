//! Exponential backoff with jitter for resubscribing watch streams.
//!
//! - Base delay doubles with each attempt: `initial_backoff * 2^attempt`
//! - Delay is capped at `max_backoff`
//! - Random jitter of 0–50% of the capped delay is added so that many nodes losing the same
//!   coordination store connection do not resubscribe in lockstep

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Backoff schedule for reconnect loops.
#[derive(Debug, Clone, PartialEq, Eq, bon::Builder, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    #[serde(with = "humantime_serde", default = "default_initial_backoff")]
    #[builder(default = default_initial_backoff())]
    pub initial_backoff: Duration,

    /// Upper bound on the delay before jitter.
    #[serde(with = "humantime_serde", default = "default_max_backoff")]
    #[builder(default = default_max_backoff())]
    pub max_backoff: Duration,
}

fn default_initial_backoff() -> Duration {
    Duration::from_millis(100)
}

fn default_max_backoff() -> Duration {
    Duration::from_secs(30)
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self { initial_backoff: default_initial_backoff(), max_backoff: default_max_backoff() }
    }
}

impl BackoffConfig {
    /// Computes the delay before retry number `attempt` (zero-based).
    ///
    /// `min(initial_backoff * 2^attempt, max_backoff) + random(0..=50% of that)`
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let base =
            self.initial_backoff.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
        let capped = base.min(self.max_backoff);

        let jitter_range = capped.as_millis() as u64 / 2;
        if jitter_range > 0 {
            capped + Duration::from_millis(rand::rng().random_range(0..=jitter_range))
        } else {
            capped
        }
    }

    /// Largest delay [`delay`](Self::delay) can return.
    #[must_use]
    pub fn ceiling(&self) -> Duration {
        self.max_backoff + self.max_backoff / 2
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_delay_exponential() {
        let config = BackoffConfig::builder()
            .initial_backoff(Duration::from_millis(100))
            .max_backoff(Duration::from_secs(60))
            .build();

        for (attempt, base_ms) in [(0u32, 100u64), (1, 200), (2, 400), (3, 800)] {
            let delay = config.delay(attempt);
            assert!(delay >= Duration::from_millis(base_ms), "attempt {attempt}: {delay:?}");
            let ceiling = Duration::from_millis(base_ms * 3 / 2);
            assert!(delay <= ceiling, "attempt {attempt}: {delay:?}");
        }
    }

    #[test]
    fn test_delay_capped_at_max() {
        let config = BackoffConfig::builder()
            .initial_backoff(Duration::from_secs(1))
            .max_backoff(Duration::from_secs(5))
            .build();

        let delay = config.delay(20);
        assert!(delay >= Duration::from_secs(5));
        assert!(delay <= config.ceiling());
    }

    #[test]
    fn test_zero_initial_backoff() {
        let config = BackoffConfig::builder().initial_backoff(Duration::ZERO).build();
        assert_eq!(config.delay(0), Duration::ZERO);
        assert_eq!(config.delay(10), Duration::ZERO);
    }

    #[test]
    fn test_deserialize_humantime() {
        let config: BackoffConfig =
            serde_json::from_str(r#"{"initial_backoff":"250ms","max_backoff":"1m"}"#).unwrap();
        assert_eq!(config.initial_backoff, Duration::from_millis(250));
        assert_eq!(config.max_backoff, Duration::from_secs(60));

        let defaults: BackoffConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(defaults, BackoffConfig::default());
    }

    proptest! {
        #[test]
        fn delay_never_exceeds_ceiling(
            initial_ms in 0u64..5_000,
            max_ms in 0u64..120_000,
            attempt in 0u32..64,
        ) {
            let config = BackoffConfig::builder()
                .initial_backoff(Duration::from_millis(initial_ms))
                .max_backoff(Duration::from_millis(max_ms))
                .build();
            prop_assert!(config.delay(attempt) <= config.ceiling());
        }
    }
}
