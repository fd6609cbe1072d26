//! Retry policy with configurable backoff and jitter.
//!
//! A [`RetryPolicy`] bundles the attempt ceiling, the backoff function and
//! the transient/fatal classifier into one value that the model invoker and
//! the notification dispatcher both take.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::classifier::ErrorClassifier;
use crate::errors::{ErrorClass, ProviderError};

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay = base * 2^attempt
    #[default]
    Exponential,
    /// delay = base * (attempt + 1)
    Linear,
    /// delay = base
    Constant,
}

/// Jitter applied on top of the backoff delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// Exact delays.
    #[default]
    None,
    /// Random from 0 to delay.
    Full,
    /// Half fixed, half random.
    Equal,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

/// Attempt ceiling, backoff function and classifier as one value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum attempts, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Cap on any single delay in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Backoff function.
    #[serde(default)]
    pub backoff: BackoffStrategy,
    /// Jitter applied to each delay.
    #[serde(default)]
    pub jitter: JitterStrategy,
    /// Transient/fatal classifier.
    #[serde(default)]
    pub classifier: ErrorClassifier,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff: BackoffStrategy::default(),
            jitter: JitterStrategy::default(),
            classifier: ErrorClassifier::default(),
        }
    }
}

impl RetryPolicy {
    /// Creates the default policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Policy for model calls: 3 attempts, exponential from 2s, capped at 30s.
    #[must_use]
    pub fn model_default() -> Self {
        Self::new()
            .with_max_attempts(3)
            .with_base_delay_ms(2_000)
            .with_max_delay_ms(30_000)
            .with_backoff(BackoffStrategy::Exponential)
    }

    /// Policy for chat delivery: 3 attempts, linear from 1s.
    #[must_use]
    pub fn notification_default() -> Self {
        Self::new()
            .with_max_attempts(3)
            .with_base_delay_ms(1_000)
            .with_max_delay_ms(10_000)
            .with_backoff(BackoffStrategy::Linear)
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff = strategy;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, strategy: JitterStrategy) -> Self {
        self.jitter = strategy;
        self
    }

    /// Sets the classifier.
    #[must_use]
    pub fn with_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Classifies a failure.
    #[must_use]
    pub fn classify(&self, err: &ProviderError) -> ErrorClass {
        self.classifier.classify(err)
    }

    /// Returns true if another attempt is allowed after `attempts_made`.
    #[must_use]
    pub fn allows_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }

    /// Delay before the retry that follows failed attempt number `attempt`
    /// (0-indexed).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay_ms;
        let max = self.max_delay_ms;

        let delay = match self.backoff {
            BackoffStrategy::Exponential => {
                base.saturating_mul(2u64.saturating_pow(attempt)).min(max)
            }
            BackoffStrategy::Linear => base.saturating_mul(u64::from(attempt) + 1).min(max),
            BackoffStrategy::Constant => base.min(max),
        };

        let jittered = match self.jitter {
            JitterStrategy::None => delay,
            JitterStrategy::Full => {
                if delay == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=delay)
                }
            }
            JitterStrategy::Equal => {
                let half = delay / 2;
                if half == 0 {
                    delay
                } else {
                    half + rand::thread_rng().gen_range(0..=half)
                }
            }
        };

        Duration::from_millis(jittered)
    }

    /// Delay before retrying `err`, honouring a server retry-after hint up
    /// to the cap.
    #[must_use]
    pub fn delay_after(&self, attempt: u32, err: &ProviderError) -> Duration {
        let computed = self.delay_for(attempt);
        match err.retry_after {
            Some(hint) => computed.max(hint).min(Duration::from_millis(self.max_delay_ms)),
            None => computed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        assert_eq!(BackoffStrategy::default(), BackoffStrategy::Exponential);
        assert_eq!(JitterStrategy::default(), JitterStrategy::None);
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
    }

    #[test]
    fn test_model_default_is_exponential() {
        let policy = RetryPolicy::model_default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(2));
        assert_eq!(policy.delay_for(1), Duration::from_secs(4));
        assert_eq!(policy.delay_for(2), Duration::from_secs(8));
        assert_eq!(policy.delay_for(10), Duration::from_secs(30));
    }

    #[test]
    fn test_notification_default_is_linear() {
        let policy = RetryPolicy::notification_default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(3));
    }

    #[test]
    fn test_constant_backoff() {
        let policy = RetryPolicy::new()
            .with_base_delay_ms(100)
            .with_backoff(BackoffStrategy::Constant);
        assert_eq!(policy.delay_for(7), Duration::from_millis(100));
    }

    #[test]
    fn test_full_jitter_stays_in_range() {
        let policy = RetryPolicy::new()
            .with_base_delay_ms(100)
            .with_jitter(JitterStrategy::Full);
        for _ in 0..50 {
            assert!(policy.delay_for(1) <= Duration::from_millis(200));
        }
    }

    #[test]
    fn test_equal_jitter_keeps_half() {
        let policy = RetryPolicy::new()
            .with_base_delay_ms(100)
            .with_jitter(JitterStrategy::Equal);
        for _ in 0..50 {
            let d = policy.delay_for(0);
            assert!(d >= Duration::from_millis(50) && d <= Duration::from_millis(100));
        }
    }

    #[test]
    fn test_retry_after_hint_is_capped() {
        let policy = RetryPolicy::model_default();
        let err = ProviderError::http(429, "quota").with_retry_after(Duration::from_secs(10));
        assert_eq!(policy.delay_after(0, &err), Duration::from_secs(10));

        let err = ProviderError::http(429, "quota").with_retry_after(Duration::from_secs(600));
        assert_eq!(policy.delay_after(0, &err), Duration::from_secs(30));
    }

    #[test]
    fn test_allows_retry() {
        let policy = RetryPolicy::new().with_max_attempts(2);
        assert!(policy.allows_retry(1));
        assert!(!policy.allows_retry(2));
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let policy: RetryPolicy =
            serde_json::from_value(serde_json::json!({"max_attempts": 5, "backoff": "linear"}))
                .unwrap();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.backoff, BackoffStrategy::Linear);
        assert_eq!(policy.base_delay_ms, 1_000);
        assert_eq!(policy.classifier, ErrorClassifier::default());
    }
}
