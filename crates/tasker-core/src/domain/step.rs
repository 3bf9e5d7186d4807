//! Step: one perceive-decide-act iteration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::action::{Action, ActionResult};
use super::screenshot::ScreenshotRef;

/// An immutable record of one loop iteration within a todo.
///
/// `screenshot` is absent when capture failed; `action` is absent when the
/// model produced no usable proposal. Either way the step still counts
/// against the todo's budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub index: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<ScreenshotRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,

    pub result: ActionResult,

    pub recorded_at: DateTime<Utc>,
}

impl Step {
    pub fn new(
        index: u32,
        screenshot: Option<ScreenshotRef>,
        action: Option<Action>,
        result: ActionResult,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            index,
            screenshot,
            action,
            result,
            recorded_at,
        }
    }

    pub fn action_kind(&self) -> Option<&str> {
        self.action.as_ref().map(Action::kind_name)
    }
}
