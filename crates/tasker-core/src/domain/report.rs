//! Report: the exported snapshot of a run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::decision::DecisionRecord;
use super::ids::{RunId, TodoId};
use super::screenshot::ScreenshotRef;
use super::step::Step;
use super::todo::TodoStatus;

/// Todo counts by status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSummary {
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
    pub aborted: usize,
}

impl StatusSummary {
    pub fn from_statuses<'a>(statuses: impl IntoIterator<Item = &'a TodoStatus>) -> Self {
        let mut counts = StatusSummary::default();
        for status in statuses {
            match status {
                TodoStatus::Pending => counts.pending += 1,
                TodoStatus::InProgress => counts.in_progress += 1,
                TodoStatus::Completed => counts.completed += 1,
                TodoStatus::Failed { .. } => counts.failed += 1,
                TodoStatus::Aborted { .. } => counts.aborted += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.pending + self.in_progress + self.completed + self.failed + self.aborted
    }
}

/// Run-level metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunHeader {
    pub run_id: RunId,
    pub task_name: String,
    pub instruction: String,
    pub model: String,
    pub max_steps: u32,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodoReport {
    pub index: usize,
    pub id: TodoId,
    pub description: String,
    pub status: TodoStatus,
    pub steps: Vec<Step>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<ScreenshotRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Absent when nothing has been registered with the observer yet.
    pub header: Option<RunHeader>,

    /// Timestamp of the last recorded event.
    pub last_event_at: Option<DateTime<Utc>>,

    pub overall_success: bool,
    pub summary: StatusSummary,
    pub todos: Vec<TodoReport>,
    pub decisions: Vec<DecisionRecord>,
}

impl Report {
    pub fn todo(&self, index: usize) -> Option<&TodoReport> {
        self.todos.get(index)
    }
}
