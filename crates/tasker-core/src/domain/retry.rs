//! Retry policy: attempt bound and backoff delays.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,

    /// Delay before the second attempt.
    #[serde(with = "millis")]
    pub base_delay: Duration,

    /// Backoff multiplier applied per further attempt. At least 1.0.
    pub multiplier: f64,

    /// Upper bound on any single delay.
    #[serde(with = "millis", default = "default_max_delay")]
    pub max_delay: Duration,
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

impl RetryPolicy {
    /// Short backoff for flaky UI actions (target not rendered yet).
    pub fn actions() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            multiplier: 2.0,
            max_delay: Duration::from_secs(5),
        }
    }

    /// Model round-trips: fewer attempts, longer pauses.
    pub fn model() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: default_max_delay(),
        }
    }

    /// No backoff at all; tests use this to stay fast.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            multiplier: 1.0,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay after `attempts` failed attempts (1-indexed):
    /// `min(base_delay * multiplier^(attempts - 1), max_delay)`.
    ///
    /// With base 250ms and multiplier 2.0: 250ms, 500ms, 1s, ...
    /// A product that is not a representable duration clamps to `max_delay`.
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(delay_secs)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Reject policies that allow no attempt or whose backoff shrinks.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".into());
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(format!(
                "multiplier must be a finite number >= 1.0, got {}",
                self.multiplier
            ));
        }
        if self.max_delay < self.base_delay {
            return Err(format!(
                "max_delay ({}ms) is below base_delay ({}ms)",
                self.max_delay.as_millis(),
                self.base_delay.as_millis()
            ));
        }
        Ok(())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::actions()
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
