//! ExecutionObserver - append-only execution history and report export.
//!
//! Recording never fails the run. Persistence problems (journal lines,
//! screenshot files) are logged and the in-memory history stays authoritative.
//!
//! History is kept per run, so several agents can share one observer. Every
//! recording call names its run; calls for a run that was never begun are
//! ignored with a warning.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

use crate::domain::{
    DecisionRecord, ExecutionEvent, Report, RunHeader, RunId, Screenshot, ScreenshotRef,
    StatusSummary, Step, Task, TodoId, TodoReport, TodoStatus,
};

const SCREENSHOT_SUBDIR: &str = "screenshots";

#[derive(Debug, Clone)]
struct TodoEntry {
    id: TodoId,
    description: String,
    status: TodoStatus,
    steps: Vec<Step>,
    checkpoint: Option<ScreenshotRef>,
}

/// Everything recorded for one run.
#[derive(Default)]
struct RunState {
    header: Option<RunHeader>,
    todos: Vec<TodoEntry>,
    decisions: Vec<DecisionRecord>,
    events: Vec<ExecutionEvent>,
    last_event_at: Option<DateTime<Utc>>,
}

impl RunState {
    fn report(&self) -> Report {
        let summary = StatusSummary::from_statuses(self.todos.iter().map(|t| &t.status));
        let overall_success = !self.todos.is_empty() && summary.completed == self.todos.len();
        let todos = self
            .todos
            .iter()
            .enumerate()
            .map(|(index, entry)| TodoReport {
                index,
                id: entry.id,
                description: entry.description.clone(),
                status: entry.status.clone(),
                steps: entry.steps.clone(),
                checkpoint: entry.checkpoint.clone(),
            })
            .collect();
        Report {
            header: self.header.clone(),
            last_event_at: self.last_event_at,
            overall_success,
            summary,
            todos,
            decisions: self.decisions.clone(),
        }
    }
}

#[derive(Default)]
struct ObserverState {
    runs: HashMap<RunId, RunState>,
    /// Registration order, for `runs()`.
    order: Vec<RunId>,
    journal: Option<tokio::fs::File>,
}

/// Collects the history of the runs it is handed.
///
/// Share it as `Arc<ExecutionObserver>`; readers take a consistent snapshot
/// of one run through `export()` or `events()` while agents keep recording.
#[derive(Default)]
pub struct ExecutionObserver {
    state: Mutex<ObserverState>,
    journal_path: Option<PathBuf>,
    screenshot_root: Option<PathBuf>,
}

impl ExecutionObserver {
    /// In-memory only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append every event as one JSON line to `path`. Lines carry the
    /// `run_id` they belong to.
    pub fn with_journal(mut self, path: impl Into<PathBuf>) -> Self {
        self.journal_path = Some(path.into());
        self
    }

    /// Write step screenshots to `<root>/screenshots/`. Refs carry the path
    /// relative to `root`, which is where the report is written.
    pub fn with_screenshot_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.screenshot_root = Some(root.into());
        self
    }

    /// Register the run and its todos (all pending). Other runs are left
    /// alone; beginning the same run again starts its history over.
    pub async fn begin_task(&self, task: &Task, started_at: DateTime<Utc>) {
        let mut state = self.state.lock().await;
        let run = RunState {
            header: Some(RunHeader {
                run_id: task.id,
                task_name: task.name.clone(),
                instruction: task.instruction.clone(),
                model: task.settings.model.clone(),
                max_steps: task.settings.max_steps,
                started_at,
            }),
            todos: task
                .todos
                .iter()
                .map(|todo| TodoEntry {
                    id: todo.id,
                    description: todo.description.clone(),
                    status: todo.status().clone(),
                    steps: todo.steps().to_vec(),
                    checkpoint: None,
                })
                .collect(),
            last_event_at: Some(started_at),
            ..RunState::default()
        };
        if state.runs.insert(task.id, run).is_none() {
            state.order.push(task.id);
        }
    }

    pub async fn todo_started(&self, run_id: RunId, todo_index: usize, at: DateTime<Utc>) {
        let mut state = self.state.lock().await;
        let Some(entry) = todo_entry(&mut state, run_id, todo_index) else {
            warn!(run = %run_id, todo = todo_index, "todo_started for unknown todo ignored");
            return;
        };
        entry.status = TodoStatus::InProgress;
        let description = entry.description.clone();
        self.append(
            &mut state,
            run_id,
            ExecutionEvent::TodoStarted {
                todo_index,
                description,
                at,
            },
            at,
        )
        .await;
    }

    /// Append a step to the todo's history.
    pub async fn record(&self, run_id: RunId, todo_index: usize, step: Step) {
        let mut state = self.state.lock().await;
        let Some(entry) = todo_entry(&mut state, run_id, todo_index) else {
            warn!(run = %run_id, todo = todo_index, step = step.index, "step for unknown todo ignored");
            return;
        };
        entry.steps.push(step.clone());
        let at = step.recorded_at;
        self.append(&mut state, run_id, ExecutionEvent::StepRecorded { todo_index, step }, at)
            .await;
    }

    pub async fn record_decision(&self, run_id: RunId, record: DecisionRecord) {
        let mut state = self.state.lock().await;
        let Some(run) = state.runs.get_mut(&run_id) else {
            warn!(run = %run_id, policy = %record.policy, "decision for unknown run ignored");
            return;
        };
        let at = record.decided_at;
        run.decisions.push(record.clone());
        self.append(&mut state, run_id, ExecutionEvent::Decision(record), at)
            .await;
    }

    pub async fn todo_finished(
        &self,
        run_id: RunId,
        todo_index: usize,
        status: TodoStatus,
        checkpoint: Option<ScreenshotRef>,
        at: DateTime<Utc>,
    ) {
        let mut state = self.state.lock().await;
        let Some(entry) = todo_entry(&mut state, run_id, todo_index) else {
            warn!(run = %run_id, todo = todo_index, "todo_finished for unknown todo ignored");
            return;
        };
        entry.status = status.clone();
        entry.checkpoint = checkpoint.clone();
        self.append(
            &mut state,
            run_id,
            ExecutionEvent::TodoFinished {
                todo_index,
                status,
                checkpoint,
                at,
            },
            at,
        )
        .await;
    }

    /// Persist a screenshot (when a root is configured) and return the ref a
    /// step keeps. A failed write yields a ref without a path.
    pub async fn store_screenshot(&self, shot: &Screenshot) -> ScreenshotRef {
        let Some(root) = &self.screenshot_root else {
            return shot.to_ref(None);
        };
        let relative = format!("{SCREENSHOT_SUBDIR}/{}.png", shot.id);
        let dir = root.join(SCREENSHOT_SUBDIR);
        let write = async {
            tokio::fs::create_dir_all(&dir).await?;
            tokio::fs::write(root.join(&relative), &shot.bytes).await
        };
        match write.await {
            Ok(()) => shot.to_ref(Some(relative)),
            Err(err) => {
                warn!(shot = %shot.id, error = %err, "failed to persist screenshot");
                shot.to_ref(None)
            }
        }
    }

    /// Runs registered so far, oldest first.
    pub async fn runs(&self) -> Vec<RunId> {
        self.state.lock().await.order.clone()
    }

    /// Snapshot of one run's event log so far. Empty for an unknown run.
    pub async fn events(&self, run_id: RunId) -> Vec<ExecutionEvent> {
        let state = self.state.lock().await;
        state
            .runs
            .get(&run_id)
            .map(|run| run.events.clone())
            .unwrap_or_default()
    }

    /// Build one run's report from recorded state only; no clock reads, so
    /// two exports without an intervening record are identical. An unknown
    /// run exports as an empty report without a header.
    pub async fn export(&self, run_id: RunId) -> Report {
        let state = self.state.lock().await;
        match state.runs.get(&run_id) {
            Some(run) => run.report(),
            None => RunState::default().report(),
        }
    }

    async fn append(
        &self,
        state: &mut ObserverState,
        run_id: RunId,
        event: ExecutionEvent,
        at: DateTime<Utc>,
    ) {
        if let Some(path) = &self.journal_path {
            if let Err(err) = write_journal_line(state, path, run_id, &event).await {
                warn!(journal = %path.display(), error = %err, "journal write failed");
            }
        }
        if let Some(run) = state.runs.get_mut(&run_id) {
            run.events.push(event);
            run.last_event_at = Some(at);
        }
    }
}

fn todo_entry(state: &mut ObserverState, run_id: RunId, todo_index: usize) -> Option<&mut TodoEntry> {
    state.runs.get_mut(&run_id)?.todos.get_mut(todo_index)
}

async fn write_journal_line(
    state: &mut ObserverState,
    path: &Path,
    run_id: RunId,
    event: &ExecutionEvent,
) -> std::io::Result<()> {
    if state.journal.is_none() {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        state.journal = Some(file);
    }
    let mut value = serde_json::to_value(event)?;
    if let serde_json::Value::Object(fields) = &mut value {
        fields.insert("run_id".into(), serde_json::json!(run_id));
    }
    let mut line = serde_json::to_vec(&value)?;
    line.push(b'\n');
    if let Some(file) = state.journal.as_mut() {
        file.write_all(&line).await?;
        file.flush().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::domain::screenshot::blank_png;
    use crate::domain::{ActionResult, ShotId, TaskSettings};
    use chrono::TimeZone;
    use ulid::Ulid;

    fn at(sec: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, sec).unwrap()
    }

    fn task(todos: &[&str]) -> Task {
        Task::new(
            RunId::from(Ulid::new()),
            "demo",
            "do things",
            todos.iter().copied(),
            || TodoId::from(Ulid::new()),
            TaskSettings::default(),
        )
    }

    fn step(index: u32) -> Step {
        Step::new(index, None, None, ActionResult::success(1), at(index % 60))
    }

    fn step_indices(report: &Report, todo: usize) -> Vec<u32> {
        report.todos[todo].steps.iter().map(|s| s.index).collect()
    }

    #[tokio::test]
    async fn records_steps_per_todo_in_order() {
        let obs = ExecutionObserver::new();
        let t = task(&["a", "b"]);
        obs.begin_task(&t, at(0)).await;
        obs.todo_started(t.id, 1, at(0)).await;
        obs.record(t.id, 1, step(1)).await;
        obs.record(t.id, 1, step(2)).await;

        let report = obs.export(t.id).await;
        assert_eq!(report.todos.len(), 2);
        assert!(report.todos[0].steps.is_empty());
        assert_eq!(step_indices(&report, 1), vec![1, 2]);
        assert_eq!(report.todos[1].status, TodoStatus::InProgress);
        assert_eq!(report.last_event_at, Some(at(2)));
    }

    #[tokio::test]
    async fn unknown_todo_or_run_is_ignored() {
        let obs = ExecutionObserver::new();
        let t = task(&["a"]);
        obs.begin_task(&t, at(0)).await;
        obs.record(t.id, 7, step(0)).await;
        let stranger = RunId::from(Ulid::new());
        obs.record(stranger, 0, step(0)).await;
        assert!(obs.events(t.id).await.is_empty());
        assert!(obs.events(stranger).await.is_empty());

        let report = obs.export(stranger).await;
        assert!(report.header.is_none());
        assert!(report.todos.is_empty());
        assert!(!report.overall_success);
    }

    #[tokio::test]
    async fn export_is_idempotent() {
        let obs = ExecutionObserver::new();
        let t = task(&["a"]);
        obs.begin_task(&t, at(0)).await;
        obs.todo_started(t.id, 0, at(0)).await;
        obs.record(t.id, 0, step(0)).await;
        obs.todo_finished(t.id, 0, TodoStatus::Completed, None, at(3)).await;

        let first = serde_json::to_string(&obs.export(t.id).await).unwrap();
        let second = serde_json::to_string(&obs.export(t.id).await).unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn summary_and_overall_success() {
        let obs = ExecutionObserver::new();
        let t = task(&["a", "b"]);
        obs.begin_task(&t, at(0)).await;
        obs.todo_finished(t.id, 0, TodoStatus::Completed, None, at(1)).await;
        obs.todo_finished(t.id, 1, TodoStatus::Failed { reason: "x".into() }, None, at(2))
            .await;
        let report = obs.export(t.id).await;
        assert_eq!(report.summary.completed, 1);
        assert_eq!(report.summary.failed, 1);
        assert!(!report.overall_success);
    }

    #[tokio::test]
    async fn runs_sharing_an_observer_stay_apart() {
        let obs = ExecutionObserver::new();
        let a = task(&["a1"]);
        let b = task(&["b1", "b2"]);
        obs.begin_task(&a, at(0)).await;
        obs.todo_started(a.id, 0, at(0)).await;
        obs.record(a.id, 0, step(0)).await;

        // b registers while a is mid-todo
        obs.begin_task(&b, at(1)).await;
        obs.todo_started(b.id, 0, at(1)).await;
        obs.record(b.id, 0, step(0)).await;
        obs.record(a.id, 0, step(1)).await;
        obs.todo_finished(a.id, 0, TodoStatus::Completed, None, at(2)).await;

        let report_a = obs.export(a.id).await;
        let report_b = obs.export(b.id).await;
        assert_eq!(report_a.header.as_ref().map(|h| h.run_id), Some(a.id));
        assert_eq!(report_a.todos.len(), 1);
        assert_eq!(report_a.todos[0].description, "a1");
        assert_eq!(step_indices(&report_a, 0), vec![0, 1]);
        assert!(report_a.overall_success);

        assert_eq!(report_b.todos.len(), 2);
        assert_eq!(step_indices(&report_b, 0), vec![0]);
        assert_eq!(report_b.todos[0].status, TodoStatus::InProgress);
        assert_eq!(obs.runs().await, vec![a.id, b.id]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn readers_see_a_gapless_prefix_while_recording() {
        const STEPS: u32 = 200;
        let obs = Arc::new(ExecutionObserver::new());
        let t = task(&["a"]);
        let run_id = t.id;
        obs.begin_task(&t, at(0)).await;
        obs.todo_started(run_id, 0, at(0)).await;

        let recorder = {
            let obs = Arc::clone(&obs);
            tokio::spawn(async move {
                for index in 0..STEPS {
                    obs.record(run_id, 0, step(index)).await;
                    tokio::task::yield_now().await;
                }
            })
        };

        let mut seen = 0;
        while seen < STEPS as usize {
            let report = obs.export(run_id).await;
            let indices = step_indices(&report, 0);
            assert!(indices.iter().copied().eq(0..indices.len() as u32));
            assert!(indices.len() >= seen);
            seen = indices.len();

            let events = obs.events(run_id).await;
            assert!(events.len() >= seen);
            tokio::task::yield_now().await;
        }
        recorder.await.unwrap();
    }

    #[tokio::test]
    async fn journal_gets_one_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run").join("journal.jsonl");
        let obs = ExecutionObserver::new().with_journal(&path);
        let t = task(&["a"]);
        obs.begin_task(&t, at(0)).await;
        obs.todo_started(t.id, 0, at(0)).await;
        obs.record(t.id, 0, step(0)).await;
        obs.todo_finished(t.id, 0, TodoStatus::Completed, None, at(2)).await;

        let raw = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 3);
        let last: serde_json::Value = serde_json::from_str(lines[2]).unwrap();
        assert_eq!(last["event"], "todo_finished");
        assert_eq!(last["todo_index"], 0);
        assert_eq!(last["run_id"], t.id.to_string());
    }

    #[tokio::test]
    async fn unwritable_journal_does_not_fail_recording() {
        let dir = tempfile::tempdir().unwrap();
        // a directory cannot be opened for appending
        let obs = ExecutionObserver::new().with_journal(dir.path());
        let t = task(&["a"]);
        obs.begin_task(&t, at(0)).await;
        obs.todo_started(t.id, 0, at(0)).await;
        obs.record(t.id, 0, step(0)).await;
        assert_eq!(obs.events(t.id).await.len(), 2);
    }

    #[tokio::test]
    async fn screenshots_are_written_under_the_root() {
        let dir = tempfile::tempdir().unwrap();
        let obs = ExecutionObserver::new().with_screenshot_root(dir.path());
        let shot =
            Screenshot::from_png(ShotId::from(Ulid::new()), blank_png(8, 6).unwrap(), at(0)).unwrap();
        let shot_ref = obs.store_screenshot(&shot).await;
        let relative = shot_ref.path.clone().expect("persisted");
        assert!(relative.starts_with("screenshots/"));
        assert!(dir.path().join(relative).exists());
        assert_eq!((shot_ref.width, shot_ref.height), (8, 6));
    }
}
