//! End-to-end runs of the agent loop against the scripted doubles.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use rstest::rstest;
use tokio_util::sync::CancellationToken;

use tasker_core::app::{RUN_CANCELLED, SKIPPED_AFTER_FAILURE, render_html, render_json};
use tasker_core::domain::{
    Action, ErrorKind, ExecutionEvent, FailurePolicy, ModelError, RetryPolicy, STEP_BUDGET_EXHAUSTED,
    TaskSettings, TaskerError, TodoStatus,
};
use tasker_core::impls::{FakeActionExecutor, ScriptedModelClient, StaticScreenshotCapturer};
use tasker_core::ports::FixedClock;
use tasker_core::{ExecutionObserver, TaskerAgent, TaskerAgentBuilder};

struct Harness {
    model: Arc<ScriptedModelClient>,
    executor: Arc<FakeActionExecutor>,
    agent: TaskerAgent,
}

fn builder(model: &Arc<ScriptedModelClient>, executor: &Arc<FakeActionExecutor>) -> TaskerAgentBuilder {
    TaskerAgentBuilder::new()
        .model_client(model.clone())
        .capturer(Arc::new(StaticScreenshotCapturer::new(1280, 800)))
        .executor(executor.clone())
        .action_retry(RetryPolicy::immediate(3))
        .model_retry(RetryPolicy::immediate(3))
}

fn harness(model: ScriptedModelClient, executor: FakeActionExecutor) -> Harness {
    let model = Arc::new(model);
    let executor = Arc::new(executor);
    let agent = builder(&model, &executor).build().expect("agent");
    Harness {
        model,
        executor,
        agent,
    }
}

fn settings(max_steps: u32) -> TaskSettings {
    TaskSettings {
        max_steps,
        ..TaskSettings::default()
    }
}

#[tokio::test]
async fn click_click_complete() {
    let h = harness(
        ScriptedModelClient::from_actions([
            Action::click(10, 10),
            Action::click(20, 20),
            Action::task_complete(),
        ]),
        FakeActionExecutor::new(),
    );
    let task = h.agent.task("demo", "do it", ["only todo"], settings(10));
    let report = h.agent.run(task).await.unwrap();

    let todo = report.todo(0).unwrap();
    assert_eq!(todo.status, TodoStatus::Completed);
    assert_eq!(todo.steps.len(), 3);
    assert_eq!(h.executor.executed(), vec![Action::click(10, 10), Action::click(20, 20)]);
    assert!(todo.steps.iter().all(|s| s.result.is_success()));
    assert_eq!(todo.steps[2].action_kind(), Some("task_complete"));
    assert!(report.overall_success);
}

#[tokio::test]
async fn every_todo_gets_one_outcome_with_gapless_steps() {
    let h = harness(
        ScriptedModelClient::from_actions([Action::click(1, 1), Action::task_complete()]).cycling(),
        FakeActionExecutor::new(),
    );
    let task = h.agent.task("demo", "three things", ["a", "b", "c"], settings(10));
    let run_id = task.id;
    let report = h.agent.run(task).await.unwrap();

    assert_eq!(report.todos.len(), 3);
    assert_eq!(report.summary.completed, 3);
    assert_eq!(report.summary.total(), 3);
    for todo in &report.todos {
        assert!(todo.status.is_terminal());
        let indices: Vec<u32> = todo.steps.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 1]);
    }

    let events = h.agent.observer().events(run_id).await;
    let finished = events
        .iter()
        .filter(|e| matches!(e, ExecutionEvent::TodoFinished { .. }))
        .count();
    assert_eq!(finished, 3);
}

#[rstest]
#[case(0)]
#[case(2)]
#[case(4)]
#[tokio::test]
async fn task_complete_at_step_k(#[case] k: usize) {
    let mut script: Vec<Action> = (0..k).map(|i| Action::click(i as i32, 0)).collect();
    script.push(Action::task_complete());
    let h = harness(ScriptedModelClient::from_actions(script), FakeActionExecutor::new());
    let task = h.agent.task("demo", "", ["t"], settings(10));
    let report = h.agent.run(task).await.unwrap();

    let todo = report.todo(0).unwrap();
    assert_eq!(todo.steps.len(), k + 1);
    assert_eq!(todo.status, TodoStatus::Completed);
}

#[tokio::test]
async fn budget_exhaustion_fails_the_todo() {
    let h = harness(
        ScriptedModelClient::from_actions([Action::click(1, 1)]).cycling(),
        FakeActionExecutor::new(),
    );
    let task = h.agent.task("demo", "", ["never ends"], settings(3));
    let report = h.agent.run(task).await.unwrap();

    let todo = report.todo(0).unwrap();
    assert_eq!(todo.steps.len(), 3);
    assert_eq!(
        todo.status,
        TodoStatus::Failed {
            reason: STEP_BUDGET_EXHAUSTED.into()
        }
    );
    assert_eq!(h.model.calls(), 3);
}

#[tokio::test]
async fn exhausted_action_retries_count_as_one_step() {
    let model = Arc::new(ScriptedModelClient::from_actions([Action::click(5, 5)]).cycling());
    let executor = Arc::new(FakeActionExecutor::new().always_fail(ErrorKind::Transient));
    let agent = builder(&model, &executor)
        .action_retry(RetryPolicy::immediate(2))
        .build()
        .unwrap();
    let task = agent.task("demo", "", ["flaky"], settings(10));
    let report = agent.run(task).await.unwrap();

    let todo = report.todo(0).unwrap();
    assert_eq!(todo.steps.len(), 1);
    assert_eq!(todo.steps[0].result.attempts, 2);
    assert_eq!(executor.executed().len(), 2);
    assert!(matches!(
        &todo.status,
        TodoStatus::Failed { reason } if reason.starts_with("action retries exhausted")
    ));
    let labels: Vec<&str> = report.decisions.iter().map(|d| d.decision.as_str()).collect();
    assert_eq!(labels, ["retry", "give_up"]);
}

#[tokio::test]
async fn cancellation_stops_at_the_next_step_boundary() {
    let token = CancellationToken::new();
    let model = Arc::new(ScriptedModelClient::from_actions([Action::click(1, 1)]).cycling());
    let executor = Arc::new(FakeActionExecutor::new().cancel_on_call(2, token.clone()));
    let agent = builder(&model, &executor)
        .cancellation(token)
        .build()
        .unwrap();
    let task = agent.task("demo", "", ["long", "never started"], settings(5));
    let report = agent.run(task).await.unwrap();

    let first = report.todo(0).unwrap();
    assert_eq!(first.steps.len(), 2);
    assert_eq!(
        first.status,
        TodoStatus::Aborted {
            reason: RUN_CANCELLED.into()
        }
    );
    let second = report.todo(1).unwrap();
    assert!(second.steps.is_empty());
    assert_eq!(second.status.reason(), Some(RUN_CANCELLED));

    assert!(render_json(&report).is_ok());
    assert!(render_html(&report).contains(RUN_CANCELLED));
}

#[tokio::test]
async fn abort_on_failure_skips_the_rest() {
    let h = harness(
        ScriptedModelClient::from_actions([Action::task_failed("login wall")]).cycling(),
        FakeActionExecutor::new(),
    );
    let task = h.agent.task(
        "demo",
        "",
        ["a", "b", "c"],
        TaskSettings {
            failure_policy: FailurePolicy::AbortOnFailure,
            ..settings(5)
        },
    );
    let report = h.agent.run(task).await.unwrap();

    assert_eq!(report.todo(0).unwrap().status.reason(), Some("login wall"));
    for i in 1..3 {
        let todo = report.todo(i).unwrap();
        assert_eq!(
            todo.status,
            TodoStatus::Aborted {
                reason: SKIPPED_AFTER_FAILURE.into()
            }
        );
    }
    assert_eq!(h.model.calls(), 1);
}

#[tokio::test]
async fn continue_on_failure_runs_every_todo() {
    let h = harness(
        ScriptedModelClient::from_actions([
            Action::task_failed("out of stock"),
            Action::task_complete(),
            Action::task_complete(),
        ]),
        FakeActionExecutor::new(),
    );
    let task = h.agent.task("demo", "", ["a", "b", "c"], settings(5));
    let report = h.agent.run(task).await.unwrap();

    assert_eq!(report.summary.failed, 1);
    assert_eq!(report.summary.completed, 2);
    assert!(!report.overall_success);
    let failed_step = &report.todo(0).unwrap().steps[0];
    assert_eq!(failed_step.result.error.as_deref(), Some("out of stock"));
}

#[tokio::test]
async fn unreachable_model_ends_the_run_with_a_partial_report() {
    let unreachable = || Err(ModelError::Unreachable("connection refused".into()));
    let h = harness(
        ScriptedModelClient::new(vec![unreachable(), unreachable(), unreachable()]),
        FakeActionExecutor::new(),
    );
    let task = h.agent.task("demo", "", ["a", "b"], settings(5));
    let run_id = task.id;
    let err = h.agent.run(task).await.unwrap_err();
    assert!(matches!(err, TaskerError::ModelUnreachable { attempts: 3, .. }));

    let report = h.agent.observer().export(run_id).await;
    assert_eq!(report.summary.aborted, 2);
    assert!(report.todos.iter().all(|t| t.steps.is_empty()));
    assert_eq!(report.decisions.len(), 3);
}

#[tokio::test]
async fn model_timeouts_become_a_failed_step() {
    let h = harness(
        ScriptedModelClient::new(vec![
            Err(ModelError::Timeout),
            Err(ModelError::Timeout),
            Err(ModelError::Timeout),
            Ok(Action::task_complete()),
        ]),
        FakeActionExecutor::new(),
    );
    let task = h.agent.task("demo", "", ["slow model"], settings(5));
    let report = h.agent.run(task).await.unwrap();

    let todo = report.todo(0).unwrap();
    assert_eq!(todo.steps.len(), 2);
    assert!(todo.steps[0].action.is_none());
    assert!(!todo.steps[0].result.is_success());
    assert_eq!(todo.status, TodoStatus::Completed);
}

#[tokio::test]
async fn malformed_and_invalid_proposals_are_recorded_and_the_loop_continues() {
    let h = harness(
        ScriptedModelClient::new(vec![
            Err(ModelError::Malformed("not json".into())),
            Ok(Action::Unrecognized { name: "drag".into() }),
            Ok(Action::task_complete()),
        ]),
        FakeActionExecutor::new(),
    );
    let task = h.agent.task("demo", "", ["t"], settings(5));
    let report = h.agent.run(task).await.unwrap();

    let todo = report.todo(0).unwrap();
    assert_eq!(todo.steps.len(), 3);
    assert!(todo.steps[0].result.error.as_deref().is_some_and(|e| e.contains("not json")));
    assert_eq!(todo.steps[1].result.attempts, 0);
    assert!(h.executor.executed().is_empty());
    assert_eq!(todo.status, TodoStatus::Completed);
}

#[tokio::test]
async fn capture_failure_is_a_step_without_screenshot() {
    let model = Arc::new(ScriptedModelClient::from_actions([Action::task_complete()]));
    let executor = Arc::new(FakeActionExecutor::new());
    let agent = builder(&model, &executor)
        .capturer(Arc::new(StaticScreenshotCapturer::new(640, 480).fail_first(1)))
        .build()
        .unwrap();
    let task = agent.task("demo", "", ["t"], settings(5));
    let report = agent.run(task).await.unwrap();

    let todo = report.todo(0).unwrap();
    assert_eq!(todo.steps.len(), 2);
    assert!(todo.steps[0].screenshot.is_none());
    assert!(todo.steps[1].screenshot.is_some());
    assert_eq!(model.calls(), 1);
}

#[tokio::test]
async fn model_sees_bounded_history_and_earlier_todos() {
    let model = Arc::new(ScriptedModelClient::from_actions([
        Action::click(1, 1),
        Action::click(1, 1),
        Action::click(1, 1),
        Action::task_complete(),
        Action::task_complete(),
    ]));
    let executor = Arc::new(FakeActionExecutor::new());
    let agent = builder(&model, &executor)
        .settings(tasker_core::app::AgentSettings {
            history_window: 2,
            ..Default::default()
        })
        .build()
        .unwrap();
    let task = agent.task("demo", "", ["first", "second"], settings(10));
    agent.run(task).await.unwrap();

    let seen = model.seen();
    let history: Vec<usize> = seen.iter().map(|c| c.history_len).collect();
    assert_eq!(history, vec![0, 1, 2, 2, 0]);
    assert_eq!(seen[4].todo, "second");
    assert_eq!(seen[4].previous_todos, 1);
    assert_eq!(seen[0].previous_todos, 0);
}

#[tokio::test]
async fn export_is_idempotent_in_both_renderings() {
    let at = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
    let model = Arc::new(ScriptedModelClient::from_actions([Action::click(1, 1), Action::task_complete()]));
    let executor = Arc::new(FakeActionExecutor::new());
    let agent = builder(&model, &executor)
        .clock(Arc::new(FixedClock::new(at)))
        .build()
        .unwrap();
    let task = agent.task("demo", "", ["t"], settings(5));
    let run_id = task.id;
    agent.run(task).await.unwrap();

    let first = agent.observer().export(run_id).await;
    let second = agent.observer().export(run_id).await;
    assert_eq!(render_json(&first).unwrap(), render_json(&second).unwrap());
    assert_eq!(render_html(&first), render_html(&second));
    assert_eq!(first.last_event_at, Some(at));
}

#[tokio::test]
async fn checkpoints_are_captured_after_completed_todos() {
    let dir = tempfile::tempdir().unwrap();
    let model = Arc::new(ScriptedModelClient::from_actions([
        Action::task_complete(),
        Action::task_failed("nope"),
    ]));
    let executor = Arc::new(FakeActionExecutor::new());
    let agent = builder(&model, &executor)
        .observer(Arc::new(ExecutionObserver::new().with_screenshot_root(dir.path())))
        .settings(tasker_core::app::AgentSettings {
            capture_checkpoints: true,
            ..Default::default()
        })
        .build()
        .unwrap();
    let task = agent.task("demo", "", ["ok", "bad"], settings(5));
    let report = agent.run(task).await.unwrap();

    let checkpoint = report.todo(0).unwrap().checkpoint.as_ref().expect("checkpoint");
    let path = checkpoint.path.as_deref().expect("persisted");
    assert!(dir.path().join(path).exists());
    assert!(report.todo(1).unwrap().checkpoint.is_none());
}

#[tokio::test]
async fn agents_sharing_an_observer_keep_separate_reports() {
    let observer = Arc::new(ExecutionObserver::new());
    let agent_for = |script: Vec<Action>| {
        let model = Arc::new(ScriptedModelClient::from_actions(script));
        let executor = Arc::new(FakeActionExecutor::new().with_latency(Duration::from_millis(5)));
        builder(&model, &executor)
            .observer(Arc::clone(&observer))
            .build()
            .unwrap()
    };
    let agent_a = agent_for(vec![Action::click(1, 1), Action::click(2, 2), Action::task_complete()]);
    let agent_b = agent_for(vec![Action::task_complete(), Action::task_complete()]);

    let task_a = agent_a.task("A", "", ["a1"], settings(10));
    let task_b = agent_b.task("B", "", ["b1", "b2"], settings(10));
    let (id_a, id_b) = (task_a.id, task_b.id);
    let (report_a, report_b) = tokio::join!(agent_a.run(task_a), agent_b.run(task_b));
    let (report_a, report_b) = (report_a.unwrap(), report_b.unwrap());

    assert_eq!(report_a.header.as_ref().map(|h| h.task_name.as_str()), Some("A"));
    let a: Vec<(&str, usize)> = report_a
        .todos
        .iter()
        .map(|t| (t.description.as_str(), t.steps.len()))
        .collect();
    assert_eq!(a, vec![("a1", 3)]);
    let indices: Vec<u32> = report_a.todos[0].steps.iter().map(|s| s.index).collect();
    assert_eq!(indices, vec![0, 1, 2]);

    assert_eq!(report_b.header.as_ref().map(|h| h.task_name.as_str()), Some("B"));
    let b: Vec<(&str, usize)> = report_b
        .todos
        .iter()
        .map(|t| (t.description.as_str(), t.steps.len()))
        .collect();
    assert_eq!(b, vec![("b1", 1), ("b2", 1)]);

    assert_eq!(observer.export(id_a).await, report_a);
    assert_eq!(observer.export(id_b).await, report_b);
    assert_eq!(observer.runs().await.len(), 2);
}
