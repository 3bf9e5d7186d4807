//! Todo lifecycle.
//!
//! State transitions:
//! - Pending -> InProgress -> Completed | Failed | Aborted
//! - Pending -> Aborted (skipped: run cancelled or an earlier todo failed
//!   under abort-on-failure)
//!
//! `finish` only accepts a `TerminalStatus`, so pending/in-progress can never
//! be re-entered through it.

use serde::{Deserialize, Serialize};

use super::errors::TaskerError;
use super::ids::TodoId;
use super::step::Step;

/// Reason recorded when a todo runs out of steps.
pub const STEP_BUDGET_EXHAUSTED: &str = "step budget exhausted";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
    Failed { reason: String },
    Aborted { reason: String },
}

impl TodoStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TodoStatus::Completed | TodoStatus::Failed { .. } | TodoStatus::Aborted { .. }
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            TodoStatus::Pending => "pending",
            TodoStatus::InProgress => "in_progress",
            TodoStatus::Completed => "completed",
            TodoStatus::Failed { .. } => "failed",
            TodoStatus::Aborted { .. } => "aborted",
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            TodoStatus::Failed { reason } | TodoStatus::Aborted { reason } => Some(reason),
            _ => None,
        }
    }
}

/// The only statuses a todo can finish in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalStatus {
    Completed,
    Failed(String),
    Aborted(String),
}

impl TerminalStatus {
    pub fn failed(reason: impl Into<String>) -> Self {
        TerminalStatus::Failed(reason.into())
    }

    pub fn aborted(reason: impl Into<String>) -> Self {
        TerminalStatus::Aborted(reason.into())
    }
}

impl From<TerminalStatus> for TodoStatus {
    fn from(status: TerminalStatus) -> Self {
        match status {
            TerminalStatus::Completed => TodoStatus::Completed,
            TerminalStatus::Failed(reason) => TodoStatus::Failed { reason },
            TerminalStatus::Aborted(reason) => TodoStatus::Aborted { reason },
        }
    }
}

/// One atomic instruction within a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Todo {
    pub id: TodoId,
    pub description: String,
    status: TodoStatus,
    steps: Vec<Step>,
}

impl Todo {
    pub fn new(id: TodoId, description: impl Into<String>) -> Self {
        Self {
            id,
            description: description.into(),
            status: TodoStatus::Pending,
            steps: Vec::new(),
        }
    }

    pub fn status(&self) -> &TodoStatus {
        &self.status
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Pending -> InProgress.
    pub fn start(&mut self) -> Result<(), TaskerError> {
        match self.status {
            TodoStatus::Pending => {
                self.status = TodoStatus::InProgress;
                Ok(())
            }
            ref other => Err(TaskerError::InvalidTransition {
                from: other.label(),
                to: "in_progress",
            }),
        }
    }

    /// InProgress -> terminal, or Pending -> Aborted.
    pub fn finish(&mut self, terminal: TerminalStatus) -> Result<(), TaskerError> {
        let allowed = match (&self.status, &terminal) {
            (TodoStatus::InProgress, _) => true,
            (TodoStatus::Pending, TerminalStatus::Aborted(_)) => true,
            _ => false,
        };
        if !allowed {
            let to = TodoStatus::from(terminal).label();
            return Err(TaskerError::InvalidTransition {
                from: self.status.label(),
                to,
            });
        }
        self.status = terminal.into();
        Ok(())
    }

    /// Append a step. Indices must be gapless from 0 and the todo must be
    /// in progress.
    pub fn push_step(&mut self, step: Step) -> Result<(), TaskerError> {
        if self.status != TodoStatus::InProgress {
            return Err(TaskerError::InvalidTransition {
                from: self.status.label(),
                to: "step",
            });
        }
        let expected = self.steps.len() as u32;
        if step.index != expected {
            return Err(TaskerError::StepIndex {
                expected,
                got: step.index,
            });
        }
        self.steps.push(step);
        Ok(())
    }

    /// The last `window` steps, oldest first.
    pub fn recent_steps(&self, window: usize) -> &[Step] {
        let start = self.steps.len().saturating_sub(window);
        &self.steps[start..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ActionResult, Step};
    use chrono::Utc;
    use rstest::rstest;
    use ulid::Ulid;

    fn todo() -> Todo {
        Todo::new(TodoId::from_ulid(Ulid::new()), "search for headphones")
    }

    fn step(index: u32) -> Step {
        Step::new(index, None, None, ActionResult::success(1), Utc::now())
    }

    #[test]
    fn new_todo_is_pending() {
        assert_eq!(todo().status(), &TodoStatus::Pending);
    }

    #[rstest]
    #[case::completed(TerminalStatus::Completed, "completed")]
    #[case::failed(TerminalStatus::failed("boom"), "failed")]
    #[case::aborted(TerminalStatus::aborted("cancelled"), "aborted")]
    fn in_progress_can_reach_every_terminal(#[case] terminal: TerminalStatus, #[case] label: &str) {
        let mut t = todo();
        t.start().unwrap();
        t.finish(terminal).unwrap();
        assert_eq!(t.status().label(), label);
        assert!(t.status().is_terminal());
    }

    #[test]
    fn terminal_todo_cannot_restart_or_refinish() {
        let mut t = todo();
        t.start().unwrap();
        t.finish(TerminalStatus::Completed).unwrap();

        assert!(matches!(t.start(), Err(TaskerError::InvalidTransition { .. })));
        assert!(t.finish(TerminalStatus::failed("late")).is_err());
        assert_eq!(t.status(), &TodoStatus::Completed);
    }

    #[test]
    fn pending_may_only_be_aborted() {
        let mut t = todo();
        assert!(t.finish(TerminalStatus::Completed).is_err());
        assert!(t.finish(TerminalStatus::failed("x")).is_err());
        t.finish(TerminalStatus::aborted("skipped")).unwrap();
        assert_eq!(t.status().reason(), Some("skipped"));
    }

    #[test]
    fn steps_must_be_gapless() {
        let mut t = todo();
        t.start().unwrap();
        t.push_step(step(0)).unwrap();
        let err = t.push_step(step(2)).unwrap_err();
        assert!(matches!(err, TaskerError::StepIndex { expected: 1, got: 2 }));
        t.push_step(step(1)).unwrap();
        assert_eq!(t.steps().len(), 2);
    }

    #[test]
    fn steps_rejected_outside_in_progress() {
        let mut t = todo();
        assert!(t.push_step(step(0)).is_err());
    }

    #[test]
    fn recent_steps_window() {
        let mut t = todo();
        t.start().unwrap();
        for i in 0..5 {
            t.push_step(step(i)).unwrap();
        }
        let recent: Vec<u32> = t.recent_steps(2).iter().map(|s| s.index).collect();
        assert_eq!(recent, vec![3, 4]);
        assert_eq!(t.recent_steps(10).len(), 5);
    }

    #[test]
    fn status_serializes_with_state_tag() {
        let v = serde_json::to_value(TodoStatus::Failed {
            reason: STEP_BUDGET_EXHAUSTED.into(),
        })
        .unwrap();
        assert_eq!(v["state"], "failed");
        assert_eq!(v["reason"], "step budget exhausted");
    }
}
