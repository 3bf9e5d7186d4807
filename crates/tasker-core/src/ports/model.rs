//! ModelClient port - the remote vision-action model.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{Action, ModelError, Screenshot, Step, TodoStatus};

/// Outcome of an earlier todo, handed to the model as context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodoDigest {
    pub description: String,
    pub status: TodoStatus,
    pub steps: usize,
}

/// Everything the model sees for one step.
#[derive(Debug, Clone, Copy)]
pub struct ModelContext<'a> {
    pub model: &'a str,
    pub instruction: &'a str,
    pub todo: &'a str,
    pub todo_index: usize,
    pub todo_count: usize,
    /// Most recent steps of the current todo, oldest first, bounded by the
    /// configured history window.
    pub history: &'a [Step],
    pub previous_todos: &'a [TodoDigest],
    pub screenshot: &'a Screenshot,
}

#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Propose the next action, or a terminal `task_complete`/`task_failed`.
    async fn propose_action(&self, context: &ModelContext<'_>) -> Result<Action, ModelError>;
}
