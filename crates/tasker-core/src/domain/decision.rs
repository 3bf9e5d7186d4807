//! Retry decisions and the records that explain them.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::ErrorKind;
use super::retry::RetryPolicy;

/// What to do after a failed attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Try again after `delay`.
    Retry { delay: Duration, reason: String },

    /// Stop retrying.
    GiveUp { reason: String },
}

impl Decision {
    pub fn label(&self) -> &'static str {
        match self {
            Decision::Retry { .. } => "retry",
            Decision::GiveUp { .. } => "give_up",
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            Decision::Retry { reason, .. } | Decision::GiveUp { reason } => reason,
        }
    }
}

/// Decides whether a failed attempt is retried.
///
/// Pure: no sleeping, no state. The caller acts on the decision.
pub trait Decider: Send + Sync {
    /// `attempts` is the number of attempts already made (1-indexed).
    fn decide(&self, attempts: u32, kind: ErrorKind) -> Decision;
}

/// Attempt-bounded exponential backoff; only transient errors are retried.
#[derive(Debug, Clone)]
pub struct RetryDecider {
    policy: RetryPolicy,
}

impl RetryDecider {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

impl Decider for RetryDecider {
    fn decide(&self, attempts: u32, kind: ErrorKind) -> Decision {
        if !kind.is_retryable() {
            return Decision::GiveUp {
                reason: format!("{kind:?} error is not retried"),
            };
        }
        if attempts >= self.policy.max_attempts {
            return Decision::GiveUp {
                reason: format!(
                    "max attempts reached: {}/{}",
                    attempts, self.policy.max_attempts
                ),
            };
        }
        let delay = self.policy.next_delay(attempts);
        Decision::Retry {
            delay,
            reason: format!(
                "retry attempt {}/{} after {:?}",
                attempts + 1,
                self.policy.max_attempts,
                delay
            ),
        }
    }
}

/// A decision made during a step, kept for the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub todo_index: usize,
    pub step_index: u32,

    /// Which policy was consulted, e.g. `action_retry`, `model_retry`.
    pub policy: String,

    /// `retry` or `give_up`.
    pub decision: String,

    /// The error and attempt counters that triggered the decision.
    pub trigger: serde_json::Value,

    pub decided_at: DateTime<Utc>,
}

impl DecisionRecord {
    pub fn new(
        todo_index: usize,
        step_index: u32,
        policy: impl Into<String>,
        decision: &Decision,
        trigger: serde_json::Value,
        decided_at: DateTime<Utc>,
    ) -> Self {
        Self {
            todo_index,
            step_index,
            policy: policy.into(),
            decision: decision.label().to_string(),
            trigger,
            decided_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn decider(max_attempts: u32) -> RetryDecider {
        RetryDecider::new(RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_secs(1),
        })
    }

    #[test]
    fn transient_error_is_retried_with_backoff() {
        let d = decider(3).decide(2, ErrorKind::Transient);
        assert_eq!(
            d,
            Decision::Retry {
                delay: Duration::from_millis(200),
                reason: "retry attempt 3/3 after 200ms".into(),
            }
        );
    }

    #[test]
    fn gives_up_at_max_attempts() {
        let d = decider(2).decide(2, ErrorKind::Transient);
        assert!(matches!(d, Decision::GiveUp { .. }));
        assert_eq!(d.reason(), "max attempts reached: 2/2");
    }

    #[rstest]
    #[case::permanent(ErrorKind::Permanent)]
    #[case::infrastructure(ErrorKind::Infrastructure)]
    fn non_transient_errors_are_not_retried(#[case] kind: ErrorKind) {
        let d = decider(5).decide(1, kind);
        assert_eq!(d.label(), "give_up");
    }
}
