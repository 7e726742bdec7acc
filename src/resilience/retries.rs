//! Connect-stage retry policy.
//!
//! # Responsibilities
//! - Decide whether a failed outbound attempt may be repeated
//! - Produce the delay before the next attempt
//!
//! Retrying is only sound while nothing has been relayed downstream, so the
//! policy is consulted by the fetcher before it hands a body to the relay and
//! never afterwards.

use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;

/// Bounded retry policy built from [`RetryConfig`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig) -> Self {
        let max_attempts = if config.enabled {
            config.max_attempts.max(1)
        } else {
            1
        };
        Self {
            max_attempts,
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms,
        }
    }

    /// A policy that makes exactly one attempt.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether another attempt is allowed after `attempts` have failed.
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Delay before the attempt following `attempts` failures.
    ///
    /// Fixed when base and max are equal. Otherwise the base doubles per
    /// failure up to max, plus up to 10% jitter.
    pub fn delay(&self, attempts: u32) -> Duration {
        if self.base_delay_ms >= self.max_delay_ms {
            return Duration::from_millis(self.base_delay_ms);
        }
        let doublings = attempts.saturating_sub(1).min(32);
        let capped = self
            .base_delay_ms
            .saturating_mul(1u64 << doublings)
            .min(self.max_delay_ms);
        let jitter = rand::thread_rng().gen_range(0..=capped / 10);
        Duration::from_millis(capped + jitter)
    }
}

/// Whether a transport error happened before any response arrived.
///
/// Redirect-loop and request-building errors are deterministic and would fail
/// the same way again.
pub fn is_retryable(error: &reqwest::Error) -> bool {
    if error.is_builder() || error.is_redirect() || error.is_status() {
        return false;
    }
    error.is_connect() || error.is_timeout() || error.is_request()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_config_allows_single_attempt() {
        let config = RetryConfig {
            enabled: false,
            ..RetryConfig::default()
        };
        let policy = RetryPolicy::new(&config);
        assert_eq!(policy.max_attempts(), 1);
        assert!(!policy.should_retry(1));
    }

    #[test]
    fn default_policy_allows_three_attempts_with_fixed_delay() {
        let policy = RetryPolicy::new(&RetryConfig::default());
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert_eq!(policy.delay(1), Duration::from_millis(500));
        assert_eq!(policy.delay(2), Duration::from_millis(500));
    }

    #[test]
    fn exponential_delay_is_capped() {
        let config = RetryConfig {
            enabled: true,
            max_attempts: 5,
            base_delay_ms: 100,
            max_delay_ms: 300,
        };
        let policy = RetryPolicy::new(&config);
        let first = policy.delay(1);
        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(110));
        let second = policy.delay(2);
        assert!(second >= Duration::from_millis(200) && second <= Duration::from_millis(220));
        let late = policy.delay(30);
        assert!(late >= Duration::from_millis(300) && late <= Duration::from_millis(330));
    }
}
