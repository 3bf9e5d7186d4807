//! Action model: what the vision-action model asks the runtime to do.

use serde::{Deserialize, Serialize};

use super::errors::ActionError;

/// Upper bound for a single `wait` action.
pub const MAX_WAIT_MS: u64 = 60_000;

/// Mouse button for click actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    #[default]
    Left,
    Right,
    Middle,
}

/// A structured descriptor of one UI operation.
///
/// Serialized with an internal `kind` tag, e.g.
/// `{"kind":"click","x":120,"y":44}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    Click {
        x: i32,
        y: i32,
        #[serde(default)]
        button: MouseButton,
        #[serde(default)]
        double: bool,
    },
    TypeText {
        text: String,
    },
    Scroll {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        x: Option<i32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        y: Option<i32>,
        #[serde(default)]
        dx: i32,
        #[serde(default)]
        dy: i32,
    },
    Wait {
        duration_ms: u64,
    },
    KeyPress {
        keys: Vec<String>,
    },
    TaskComplete {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        summary: Option<String>,
    },
    TaskFailed {
        reason: String,
    },
    /// A kind the model emitted that this runtime does not know.
    Unrecognized {
        name: String,
    },
}

const KNOWN_KINDS: &[&str] = &[
    "click",
    "type_text",
    "scroll",
    "wait",
    "key_press",
    "task_complete",
    "task_failed",
];

impl Action {
    pub fn click(x: i32, y: i32) -> Self {
        Action::Click {
            x,
            y,
            button: MouseButton::Left,
            double: false,
        }
    }

    pub fn type_text(text: impl Into<String>) -> Self {
        Action::TypeText { text: text.into() }
    }

    pub fn scroll(dx: i32, dy: i32) -> Self {
        Action::Scroll {
            x: None,
            y: None,
            dx,
            dy,
        }
    }

    pub fn wait(duration_ms: u64) -> Self {
        Action::Wait { duration_ms }
    }

    pub fn key_press<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Action::KeyPress {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    pub fn task_complete() -> Self {
        Action::TaskComplete { summary: None }
    }

    pub fn task_failed(reason: impl Into<String>) -> Self {
        Action::TaskFailed {
            reason: reason.into(),
        }
    }

    /// Parse a model-provided action. Unknown kinds become
    /// `Action::Unrecognized` instead of an error so the executor can reject
    /// them explicitly; known kinds with bad parameters are an error.
    pub fn from_wire(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        let kind = value
            .get("kind")
            .and_then(|k| k.as_str())
            .map(str::to_owned);
        match kind {
            Some(kind) if !KNOWN_KINDS.contains(&kind.as_str()) => {
                Ok(Action::Unrecognized { name: kind })
            }
            _ => serde_json::from_value(value),
        }
    }

    /// The wire name of this action's kind.
    pub fn kind_name(&self) -> &str {
        match self {
            Action::Click { .. } => "click",
            Action::TypeText { .. } => "type_text",
            Action::Scroll { .. } => "scroll",
            Action::Wait { .. } => "wait",
            Action::KeyPress { .. } => "key_press",
            Action::TaskComplete { .. } => "task_complete",
            Action::TaskFailed { .. } => "task_failed",
            Action::Unrecognized { name } => name,
        }
    }

    /// `task_complete` and `task_failed` end the current todo.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Action::TaskComplete { .. } | Action::TaskFailed { .. })
    }

    /// Check parameter well-formedness. Screen bounds are the executor's call.
    pub fn validate(&self) -> Result<(), ActionError> {
        match self {
            Action::TypeText { text } if text.is_empty() => {
                Err(ActionError::InvalidAction("type_text with empty text".into()))
            }
            Action::KeyPress { keys } if keys.is_empty() || keys.iter().any(|k| k.trim().is_empty()) => {
                Err(ActionError::InvalidAction("key_press with empty key".into()))
            }
            Action::Scroll { dx: 0, dy: 0, .. } => {
                Err(ActionError::InvalidAction("scroll with zero delta".into()))
            }
            Action::Wait { duration_ms } if *duration_ms > MAX_WAIT_MS => Err(
                ActionError::InvalidAction(format!("wait of {duration_ms}ms exceeds {MAX_WAIT_MS}ms")),
            ),
            Action::Unrecognized { name } => {
                Err(ActionError::InvalidAction(format!("unrecognized action kind '{name}'")))
            }
            _ => Ok(()),
        }
    }
}

/// Outcome classification of an executed action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Success,
    Failure,
}

/// Outcome of executing (or attempting to execute) an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    pub status: ActionStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Executor invocations made for this step (0 when nothing was executed).
    #[serde(default)]
    pub attempts: u32,
}

impl ActionResult {
    pub fn success(attempts: u32) -> Self {
        Self {
            status: ActionStatus::Success,
            error: None,
            attempts,
        }
    }

    pub fn failure(error: impl Into<String>, attempts: u32) -> Self {
        Self {
            status: ActionStatus::Failure,
            error: Some(error.into()),
            attempts,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ActionStatus::Success
    }
}
