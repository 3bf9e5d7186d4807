//! Domain model (ids, task/todo/step, actions, decisions, reports).

pub mod action;
pub mod decision;
pub mod errors;
pub mod events;
pub mod ids;
pub mod report;
pub mod retry;
pub mod screenshot;
pub mod step;
pub mod task;
pub mod todo;

pub use action::{Action, ActionResult, ActionStatus, MouseButton};
pub use decision::{Decider, Decision, DecisionRecord, RetryDecider};
pub use errors::{ActionError, CaptureError, ErrorKind, ModelError, TaskerError};
pub use events::ExecutionEvent;
pub use ids::{RunId, ShotId, TodoId};
pub use report::{Report, RunHeader, StatusSummary, TodoReport};
pub use retry::RetryPolicy;
pub use screenshot::{Screenshot, ScreenshotRef};
pub use step::Step;
pub use task::{FailurePolicy, Task, TaskSettings};
pub use todo::{STEP_BUDGET_EXHAUSTED, TerminalStatus, Todo, TodoStatus};
