//! Export retry policy: exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

use crate::config::TelemetryConfig;

/// How many times a batch is offered to the sink and how long to wait between tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts including the first. Never zero.
    pub attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &TelemetryConfig) -> Self {
        Self {
            attempts: config.export_attempts.max(1),
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
        }
    }

    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self {
            attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (1 for the first retry).
    ///
    /// `base * 2^(retry-1)`, capped at `max_delay`, plus up to 10% jitter.
    pub fn delay_before(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }

        let factor = 1u32.checked_shl(retry - 1).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor).min(self.max_delay);
        delay + delay.mul_f64(rand::thread_rng().gen_range(0.0..0.1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy {
            attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
        };

        assert_eq!(policy.delay_before(0), Duration::ZERO);
        let first = policy.delay_before(1).as_millis();
        assert!((100..110).contains(&first), "{first}");
        let second = policy.delay_before(2).as_millis();
        assert!((200..220).contains(&second), "{second}");
        let capped = policy.delay_before(10).as_millis();
        assert!((1000..1100).contains(&capped), "{capped}");
    }

    #[test]
    fn jitter_stays_within_a_tenth() {
        let policy = RetryPolicy {
            attempts: 40,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(400),
        };

        for retry in 1..40 {
            let delay = policy.delay_before(retry);
            let floor = Duration::from_millis(50 << (retry - 1).min(3)).min(policy.max_delay);
            assert!(delay >= floor, "retry {retry}: {delay:?}");
            assert!(delay < floor + floor / 10, "retry {retry}: {delay:?}");
        }
    }

    #[test]
    fn attempts_never_zero() {
        let config = TelemetryConfig {
            export_attempts: 0,
            ..TelemetryConfig::default()
        };
        assert_eq!(RetryPolicy::from_config(&config).attempts, 1);
        assert_eq!(RetryPolicy::none().delay_before(3), Duration::ZERO);
    }
}
