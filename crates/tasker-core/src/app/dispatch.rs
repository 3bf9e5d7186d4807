//! ActionDispatcher - validated, retried, time-bounded action execution.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{debug, warn};

use crate::domain::{
    Action, ActionError, ActionResult, Decider, Decision, DecisionRecord, ErrorKind,
};
use crate::ports::{ActionExecutor, Clock};

pub const ACTION_RETRY_POLICY: &str = "action_retry";

/// Result of dispatching one action.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    /// What the step records. `attempts` counts executor invocations.
    pub result: ActionResult,

    /// Set when the failure must end the todo: transient retries ran out,
    /// or the input backend itself is unavailable.
    pub fatal: Option<String>,

    /// One record per retry or give-up.
    pub decisions: Vec<DecisionRecord>,
}

pub struct ActionDispatcher {
    executor: Arc<dyn ActionExecutor>,
    decider: Arc<dyn Decider>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl ActionDispatcher {
    pub fn new(
        executor: Arc<dyn ActionExecutor>,
        decider: Arc<dyn Decider>,
        clock: Arc<dyn Clock>,
        timeout: Duration,
    ) -> Self {
        Self {
            executor,
            decider,
            clock,
            timeout,
        }
    }

    /// Validate `action`, then execute it until it succeeds or the decider
    /// gives up. Never returns an error: every failure ends up in the result.
    ///
    /// A retried click may land twice if the first attempt took effect
    /// before reporting failure.
    pub async fn dispatch(&self, action: &Action, todo_index: usize, step_index: u32) -> DispatchOutcome {
        let mut decisions = Vec::new();

        if let Err(err) = action.validate() {
            let decision = self.decider.decide(0, err.kind());
            decisions.push(self.record(todo_index, step_index, &decision, &err, 0));
            return DispatchOutcome {
                result: ActionResult::failure(err.to_string(), 0),
                fatal: None,
                decisions,
            };
        }

        let mut attempts = 0;
        loop {
            attempts += 1;
            let err = match tokio::time::timeout(self.timeout, self.executor.execute(action)).await {
                Ok(Ok(())) => {
                    debug!(todo = todo_index, step = step_index, kind = action.kind_name(), attempts, "action executed");
                    return DispatchOutcome {
                        result: ActionResult::success(attempts),
                        fatal: None,
                        decisions,
                    };
                }
                Ok(Err(err)) => err,
                Err(_) => ActionError::Timeout(self.timeout),
            };

            let kind = err.kind();
            let decision = self.decider.decide(attempts, kind);
            decisions.push(self.record(todo_index, step_index, &decision, &err, attempts));

            match decision {
                Decision::Retry { delay, reason } => {
                    warn!(todo = todo_index, step = step_index, kind = action.kind_name(), error = %err, %reason, "retrying action");
                    tokio::time::sleep(delay).await;
                }
                Decision::GiveUp { reason } => {
                    warn!(todo = todo_index, step = step_index, kind = action.kind_name(), error = %err, %reason, "action given up");
                    let fatal = match kind {
                        ErrorKind::Transient => Some(format!("action retries exhausted: {err}")),
                        ErrorKind::Infrastructure => Some(err.to_string()),
                        ErrorKind::Permanent => None,
                    };
                    return DispatchOutcome {
                        result: ActionResult::failure(err.to_string(), attempts),
                        fatal,
                        decisions,
                    };
                }
            }
        }
    }

    fn record(
        &self,
        todo_index: usize,
        step_index: u32,
        decision: &Decision,
        err: &ActionError,
        attempts: u32,
    ) -> DecisionRecord {
        DecisionRecord::new(
            todo_index,
            step_index,
            ACTION_RETRY_POLICY,
            decision,
            json!({
                "error": err.to_string(),
                "error_kind": format!("{:?}", err.kind()),
                "attempts": attempts,
                "reason": decision.reason(),
            }),
            self.clock.now(),
        )
    }
}
