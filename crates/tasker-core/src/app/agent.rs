//! TaskerAgent - the perceive, decide, act loop over a task's todos.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::app::dispatch::ActionDispatcher;
use crate::app::observer::ExecutionObserver;
use crate::domain::{
    Action, ActionResult, CaptureError, Decider, Decision, DecisionRecord, FailurePolicy,
    ModelError, Report, RunId, STEP_BUDGET_EXHAUSTED, Screenshot, ScreenshotRef, Step,
    Task, TaskSettings, TaskerError, TerminalStatus, TodoStatus,
};
use crate::ports::{Clock, IdGenerator, ModelClient, ModelContext, ScreenshotCapturer, TodoDigest};

pub const RUN_CANCELLED: &str = "run cancelled";
pub const SKIPPED_AFTER_FAILURE: &str = "skipped after earlier failure";
pub const MODEL_RETRY_POLICY: &str = "model_retry";

/// Loop tuning that is not part of the task itself.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub history_window: usize,
    pub capture_timeout: Duration,
    pub model_timeout: Duration,
    pub capture_checkpoints: bool,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            history_window: 8,
            capture_timeout: Duration::from_secs(5),
            model_timeout: Duration::from_secs(60),
            capture_checkpoints: false,
        }
    }
}

/// What one iteration produced.
struct StepOutcome {
    step: Step,
    terminal: Option<TerminalStatus>,
}

pub struct TaskerAgent {
    pub(crate) model: Arc<dyn ModelClient>,
    pub(crate) capturer: Arc<dyn ScreenshotCapturer>,
    pub(crate) dispatcher: ActionDispatcher,
    pub(crate) model_decider: Arc<dyn Decider>,
    pub(crate) observer: Arc<ExecutionObserver>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) ids: Arc<dyn IdGenerator>,
    pub(crate) settings: AgentSettings,
    pub(crate) cancel: CancellationToken,
}

impl TaskerAgent {
    pub fn observer(&self) -> &Arc<ExecutionObserver> {
        &self.observer
    }

    /// Cancelling this token stops the run at the next step boundary.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Build a task with ids from this agent's generator.
    pub fn task<I, S>(
        &self,
        name: impl Into<String>,
        instruction: impl Into<String>,
        todos: I,
        settings: TaskSettings,
    ) -> Task
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Task::new(
            self.ids.generate_run_id(),
            name,
            instruction,
            todos,
            || self.ids.generate_todo_id(),
            settings,
        )
    }

    /// Execute every todo in order and return the final report.
    ///
    /// Step-level failures are recorded and never returned. On a process
    /// level error the current and remaining todos are aborted first, so the
    /// observer still holds one terminal entry per todo.
    pub async fn run(&self, mut task: Task) -> Result<Report, TaskerError> {
        let started_at = self.clock.now();
        self.observer.begin_task(&task, started_at).await;
        info!(run = %task.id, task = %task.name, todos = task.todos.len(), "run started");

        let mut digests: Vec<TodoDigest> = Vec::with_capacity(task.todos.len());
        let mut halted: Option<&'static str> = None;

        for index in 0..task.todos.len() {
            if let Some(reason) = halted {
                self.abort_todo(&mut task, index, reason).await;
                continue;
            }

            let status = match self.run_todo(&mut task, index, &digests).await {
                Ok(status) => status,
                Err(err) => {
                    warn!(run = %task.id, todo = index, error = %err, "run failed");
                    let reason = err.to_string();
                    for rest in index..task.todos.len() {
                        self.abort_todo(&mut task, rest, &reason).await;
                    }
                    return Err(err);
                }
            };

            halted = match &status {
                TodoStatus::Aborted { .. } if self.cancel.is_cancelled() => Some(RUN_CANCELLED),
                TodoStatus::Failed { .. }
                    if task.settings.failure_policy == FailurePolicy::AbortOnFailure =>
                {
                    Some(SKIPPED_AFTER_FAILURE)
                }
                _ => None,
            };

            let todo = &task.todos[index];
            digests.push(TodoDigest {
                description: todo.description.clone(),
                status,
                steps: todo.steps().len(),
            });
        }

        let report = self.observer.export(task.id).await;
        info!(
            run = %task.id,
            completed = report.summary.completed,
            failed = report.summary.failed,
            aborted = report.summary.aborted,
            success = report.overall_success,
            "run finished"
        );
        Ok(report)
    }

    async fn run_todo(
        &self,
        task: &mut Task,
        index: usize,
        digests: &[TodoDigest],
    ) -> Result<TodoStatus, TaskerError> {
        let run_id = task.id;
        let max_steps = task.settings.max_steps;
        let todo_count = task.todos.len();
        let todo = &mut task.todos[index];

        todo.start()?;
        self.observer.todo_started(run_id, index, self.clock.now()).await;
        info!(todo = index, description = %todo.description, "todo started");

        let terminal = loop {
            let step_index = todo.steps().len() as u32;
            if step_index >= max_steps {
                break TerminalStatus::failed(STEP_BUDGET_EXHAUSTED);
            }
            if self.cancel.is_cancelled() {
                break TerminalStatus::aborted(RUN_CANCELLED);
            }

            let outcome = {
                let frame = Frame {
                    run_id,
                    model: &task.settings.model,
                    instruction: &task.instruction,
                    todo: &todo.description,
                    todo_index: index,
                    todo_count,
                    history: todo.recent_steps(self.settings.history_window),
                    previous_todos: digests,
                    step_index,
                };
                self.step(frame).await?
            };

            debug!(
                todo = index,
                step = step_index,
                kind = outcome.step.action_kind().unwrap_or("-"),
                success = outcome.step.result.is_success(),
                "step recorded"
            );
            todo.push_step(outcome.step.clone())?;
            self.observer.record(run_id, index, outcome.step).await;

            if let Some(terminal) = outcome.terminal {
                break terminal;
            }
        };

        let checkpoint = match (&terminal, self.settings.capture_checkpoints) {
            (TerminalStatus::Completed, true) => self.checkpoint(index).await,
            _ => None,
        };

        todo.finish(terminal)?;
        let status = todo.status().clone();
        self.observer
            .todo_finished(run_id, index, status.clone(), checkpoint, self.clock.now())
            .await;
        match &status {
            TodoStatus::Completed => info!(todo = index, steps = todo.steps().len(), "todo completed"),
            other => warn!(
                todo = index,
                steps = todo.steps().len(),
                status = other.label(),
                reason = other.reason().unwrap_or(""),
                "todo did not complete"
            ),
        }
        Ok(status)
    }

    /// One iteration: capture, ask the model, act.
    async fn step(&self, frame: Frame<'_>) -> Result<StepOutcome, TaskerError> {
        let shot = match self.capture().await {
            Ok(shot) => shot,
            Err(err) => {
                warn!(todo = frame.todo_index, step = frame.step_index, error = %err, "capture failed");
                let result = ActionResult::failure(err.to_string(), 0);
                return Ok(self.finish_step(frame.step_index, None, None, result, None));
            }
        };
        let shot_ref = self.observer.store_screenshot(&shot).await;

        let context = ModelContext {
            model: frame.model,
            instruction: frame.instruction,
            todo: frame.todo,
            todo_index: frame.todo_index,
            todo_count: frame.todo_count,
            history: frame.history,
            previous_todos: frame.previous_todos,
            screenshot: &shot,
        };

        let action = match self.propose(&context, frame.run_id, frame.step_index).await? {
            Ok(action) => action,
            Err(err) => {
                return Ok(self.finish_step(
                    frame.step_index,
                    Some(shot_ref),
                    None,
                    ActionResult::failure(err.to_string(), 0),
                    None,
                ));
            }
        };

        let outcome = match &action {
            Action::TaskComplete { .. } => self.finish_step(
                frame.step_index,
                Some(shot_ref),
                Some(action),
                ActionResult::success(0),
                Some(TerminalStatus::Completed),
            ),
            Action::TaskFailed { reason } => {
                let reason = reason.clone();
                self.finish_step(
                    frame.step_index,
                    Some(shot_ref),
                    Some(action),
                    ActionResult::failure(reason.clone(), 0),
                    Some(TerminalStatus::Failed(reason)),
                )
            }
            _ => {
                let dispatched = self
                    .dispatcher
                    .dispatch(&action, frame.todo_index, frame.step_index)
                    .await;
                for record in dispatched.decisions {
                    self.observer.record_decision(frame.run_id, record).await;
                }
                self.finish_step(
                    frame.step_index,
                    Some(shot_ref),
                    Some(action),
                    dispatched.result,
                    dispatched.fatal.map(TerminalStatus::Failed),
                )
            }
        };
        Ok(outcome)
    }

    fn finish_step(
        &self,
        index: u32,
        screenshot: Option<ScreenshotRef>,
        action: Option<Action>,
        result: ActionResult,
        terminal: Option<TerminalStatus>,
    ) -> StepOutcome {
        StepOutcome {
            step: Step::new(index, screenshot, action, result, self.clock.now()),
            terminal,
        }
    }

    async fn capture(&self) -> Result<Screenshot, CaptureError> {
        let timeout = self.settings.capture_timeout;
        match tokio::time::timeout(timeout, self.capturer.capture()).await {
            Ok(result) => result,
            Err(_) => Err(CaptureError::Timeout(timeout)),
        }
    }

    /// Ask the model, retrying transient failures on the same step.
    ///
    /// The outer error is process-level (model unreachable after all
    /// attempts); the inner one becomes a failed step.
    async fn propose(
        &self,
        context: &ModelContext<'_>,
        run_id: RunId,
        step_index: u32,
    ) -> Result<Result<Action, ModelError>, TaskerError> {
        let timeout = self.settings.model_timeout;
        let mut attempts = 0;
        loop {
            attempts += 1;
            let err = match tokio::time::timeout(timeout, self.model.propose_action(context)).await {
                Ok(Ok(action)) => return Ok(Ok(action)),
                Ok(Err(err)) => err,
                Err(_) => ModelError::Timeout,
            };

            let kind = err.kind();
            let decision = self.model_decider.decide(attempts, kind);
            self.observer
                .record_decision(run_id, DecisionRecord::new(
                    context.todo_index,
                    step_index,
                    MODEL_RETRY_POLICY,
                    &decision,
                    json!({
                        "error": err.to_string(),
                        "error_kind": format!("{kind:?}"),
                        "attempts": attempts,
                        "reason": decision.reason(),
                    }),
                    self.clock.now(),
                ))
                .await;

            match decision {
                Decision::Retry { delay, reason } => {
                    warn!(todo = context.todo_index, step = step_index, error = %err, %reason, "retrying model request");
                    tokio::time::sleep(delay).await;
                }
                Decision::GiveUp { reason } => {
                    warn!(todo = context.todo_index, step = step_index, error = %err, %reason, "model request given up");
                    return match err {
                        ModelError::Unreachable(_) => Err(TaskerError::ModelUnreachable {
                            attempts,
                            source: err,
                        }),
                        other => Ok(Err(other)),
                    };
                }
            }
        }
    }

    async fn checkpoint(&self, index: usize) -> Option<ScreenshotRef> {
        match self.capture().await {
            Ok(shot) => Some(self.observer.store_screenshot(&shot).await),
            Err(err) => {
                warn!(todo = index, error = %err, "checkpoint capture failed");
                None
            }
        }
    }

    /// Abort a todo that is not terminal yet. Used for skips and for cleanup
    /// on the error path, so it only logs a failed transition.
    async fn abort_todo(&self, task: &mut Task, index: usize, reason: &str) {
        let todo = &mut task.todos[index];
        if todo.status().is_terminal() {
            return;
        }
        if let Err(err) = todo.finish(TerminalStatus::aborted(reason)) {
            warn!(todo = index, error = %err, "could not abort todo");
            return;
        }
        info!(todo = index, %reason, "todo aborted");
        self.observer
            .todo_finished(task.id, index, todo.status().clone(), None, self.clock.now())
            .await;
    }
}

/// Borrowed inputs for one step.
struct Frame<'a> {
    run_id: RunId,
    model: &'a str,
    instruction: &'a str,
    todo: &'a str,
    todo_index: usize,
    todo_count: usize,
    history: &'a [Step],
    previous_todos: &'a [TodoDigest],
    step_index: u32,
}
