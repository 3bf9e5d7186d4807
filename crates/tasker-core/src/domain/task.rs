//! Task: the user-level goal and its ordered todos.

use serde::{Deserialize, Serialize};

use super::ids::{RunId, TodoId};
use super::todo::Todo;

/// What to do with the remaining todos once one fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    #[default]
    ContinueOnFailure,
    AbortOnFailure,
}

/// Per-task execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSettings {
    /// Step budget per todo.
    pub max_steps: u32,

    /// Model identifier passed to the model client.
    pub model: String,

    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self {
            max_steps: 24,
            model: "lux-actor-1".to_string(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Task {
    pub id: RunId,
    pub name: String,
    pub instruction: String,
    pub todos: Vec<Todo>,
    pub settings: TaskSettings,
}

impl Task {
    /// Build a task from todo descriptions; `todo_id` is called once per todo.
    pub fn new<I, S>(
        id: RunId,
        name: impl Into<String>,
        instruction: impl Into<String>,
        todos: I,
        mut todo_id: impl FnMut() -> TodoId,
        settings: TaskSettings,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id,
            name: name.into(),
            instruction: instruction.into(),
            todos: todos
                .into_iter()
                .map(|description| Todo::new(todo_id(), description))
                .collect(),
            settings,
        }
    }
}
