use std::time::Duration;

use rand::Rng;

use super::classify::FailureClassifier;
use crate::error::{EngineError, EngineResult};

/// Exponential backoff with additive jitter.
///
/// The attempt bound is fixed when the policy is built; there is no way to
/// change it afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    multiplier: f64,
    jitter: Duration,
    classifier: FailureClassifier,
    enforce_distinct_output: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(900),
            multiplier: 1.6,
            jitter: Duration::from_millis(350),
            classifier: FailureClassifier::default(),
            enforce_distinct_output: false,
        }
    }
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        multiplier: f64,
        jitter: Duration,
    ) -> EngineResult<Self> {
        if max_attempts == 0 {
            return Err(EngineError::config("retry policy needs at least one attempt"));
        }
        if !multiplier.is_finite() || multiplier < 0.0 {
            return Err(EngineError::config(format!(
                "retry multiplier must be a non-negative number (got {multiplier})"
            )));
        }
        Ok(Self {
            max_attempts,
            base_delay,
            multiplier,
            jitter,
            ..Self::default()
        })
    }

    pub fn single_attempt() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn with_classifier(mut self, classifier: FailureClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_enforce_distinct_output(mut self, enabled: bool) -> Self {
        self.enforce_distinct_output = enabled;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    pub fn jitter(&self) -> Duration {
        self.jitter
    }

    pub fn classifier(&self) -> &FailureClassifier {
        &self.classifier
    }

    pub fn enforce_distinct_output(&self) -> bool {
        self.enforce_distinct_output
    }

    /// Deterministic part of the delay after a failed `attempt` (1-based).
    pub fn backoff_floor(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        if exponent == 0 {
            return self.base_delay;
        }
        let seconds = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
    }

    /// Delay before the attempt following `attempt`. Jitter is drawn fresh for
    /// every call from `[0, jitter)`.
    pub fn backoff_delay<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let floor = self.backoff_floor(attempt);
        let jitter_s = self.jitter.as_secs_f64();
        if jitter_s <= 0.0 {
            return floor;
        }
        let extra = rng.gen_range(0.0..jitter_s);
        floor.saturating_add(Duration::from_secs_f64(extra))
    }
}
