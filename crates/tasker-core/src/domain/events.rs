//! Execution events: the append-only history kept by the observer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::decision::DecisionRecord;
use super::screenshot::ScreenshotRef;
use super::step::Step;
use super::todo::TodoStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExecutionEvent {
    /// Split marker: a todo began.
    TodoStarted {
        todo_index: usize,
        description: String,
        at: DateTime<Utc>,
    },

    StepRecorded {
        todo_index: usize,
        step: Step,
    },

    Decision(DecisionRecord),

    /// Split marker: a todo reached a terminal status.
    TodoFinished {
        todo_index: usize,
        status: TodoStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        checkpoint: Option<ScreenshotRef>,
        at: DateTime<Utc>,
    },
}

impl ExecutionEvent {
    pub fn todo_index(&self) -> usize {
        match self {
            ExecutionEvent::TodoStarted { todo_index, .. }
            | ExecutionEvent::StepRecorded { todo_index, .. }
            | ExecutionEvent::TodoFinished { todo_index, .. } => *todo_index,
            ExecutionEvent::Decision(record) => record.todo_index,
        }
    }
}
