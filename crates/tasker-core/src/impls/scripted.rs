//! Deterministic doubles for the ports. Used by tests and by `--dry-run`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use crate::domain::screenshot::blank_png;
use crate::domain::{Action, ActionError, CaptureError, ErrorKind, ModelError, Screenshot};
use crate::ports::{
    ActionExecutor, Clock, IdGenerator, ModelClient, ModelContext, ScreenshotCapturer,
    SystemClock, UlidGenerator,
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

/// What the scripted model saw on one call.
#[derive(Debug, Clone, PartialEq)]
pub struct SeenContext {
    pub todo_index: usize,
    pub todo: String,
    pub history_len: usize,
    pub previous_todos: usize,
}

/// Replays a fixed list of responses, then either cycles or reports the
/// script as exhausted (`ModelError::Malformed`).
pub struct ScriptedModelClient {
    script: Vec<Result<Action, ModelError>>,
    queue: Mutex<VecDeque<Result<Action, ModelError>>>,
    cycle: bool,
    seen: Mutex<Vec<SeenContext>>,
}

impl ScriptedModelClient {
    pub fn new(script: Vec<Result<Action, ModelError>>) -> Self {
        Self {
            queue: Mutex::new(script.iter().map(clone_response).collect()),
            script,
            cycle: false,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn from_actions(actions: impl IntoIterator<Item = Action>) -> Self {
        Self::new(actions.into_iter().map(Ok).collect())
    }

    /// Start over from the first response when the script runs out.
    pub fn cycling(mut self) -> Self {
        self.cycle = true;
        self
    }

    pub fn calls(&self) -> usize {
        lock(&self.seen).len()
    }

    pub fn seen(&self) -> Vec<SeenContext> {
        lock(&self.seen).clone()
    }

    fn next(&self) -> Result<Action, ModelError> {
        let mut queue = lock(&self.queue);
        if queue.is_empty() && self.cycle {
            queue.extend(self.script.iter().map(clone_response));
        }
        queue
            .pop_front()
            .unwrap_or_else(|| Err(ModelError::Malformed("script exhausted".into())))
    }
}

fn clone_response(r: &Result<Action, ModelError>) -> Result<Action, ModelError> {
    match r {
        Ok(action) => Ok(action.clone()),
        Err(ModelError::Timeout) => Err(ModelError::Timeout),
        Err(ModelError::Unreachable(m)) => Err(ModelError::Unreachable(m.clone())),
        Err(ModelError::Rejected { status, body }) => Err(ModelError::Rejected {
            status: *status,
            body: body.clone(),
        }),
        Err(ModelError::Malformed(m)) => Err(ModelError::Malformed(m.clone())),
    }
}

#[async_trait]
impl ModelClient for ScriptedModelClient {
    async fn propose_action(&self, context: &ModelContext<'_>) -> Result<Action, ModelError> {
        lock(&self.seen).push(SeenContext {
            todo_index: context.todo_index,
            todo: context.todo.to_string(),
            history_len: context.history.len(),
            previous_todos: context.previous_todos.len(),
        });
        self.next()
    }
}

#[derive(Debug, Clone, Copy)]
enum FailureMode {
    Never,
    First(u32, ErrorKind),
    Always(ErrorKind),
}

fn injected(kind: ErrorKind) -> ActionError {
    match kind {
        ErrorKind::Transient => ActionError::Failed("injected failure".into()),
        ErrorKind::Permanent => ActionError::InvalidAction("injected failure".into()),
        ErrorKind::Infrastructure => ActionError::Unavailable("injected failure".into()),
    }
}

/// Records every action it is asked to execute; failures are injected by
/// configuration.
pub struct FakeActionExecutor {
    mode: FailureMode,
    bounds: Option<(u32, u32)>,
    latency: Option<Duration>,
    cancel_on_call: Option<(u32, CancellationToken)>,
    calls: AtomicU32,
    executed: Mutex<Vec<Action>>,
}

impl FakeActionExecutor {
    pub fn new() -> Self {
        Self {
            mode: FailureMode::Never,
            bounds: None,
            latency: None,
            cancel_on_call: None,
            calls: AtomicU32::new(0),
            executed: Mutex::new(Vec::new()),
        }
    }

    /// Fail the first `n` calls with an error of `kind`.
    pub fn fail_first(mut self, n: u32, kind: ErrorKind) -> Self {
        self.mode = FailureMode::First(n, kind);
        self
    }

    pub fn always_fail(mut self, kind: ErrorKind) -> Self {
        self.mode = FailureMode::Always(kind);
        self
    }

    /// Reject pointer coordinates outside `width` x `height`.
    pub fn with_bounds(mut self, width: u32, height: u32) -> Self {
        self.bounds = Some((width, height));
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Cancel `token` while serving the `call`-th call (1-indexed).
    pub fn cancel_on_call(mut self, call: u32, token: CancellationToken) -> Self {
        self.cancel_on_call = Some((call, token));
        self
    }

    pub fn executed(&self) -> Vec<Action> {
        lock(&self.executed).clone()
    }

    fn check_bounds(&self, action: &Action) -> Result<(), ActionError> {
        let Some((width, height)) = self.bounds else {
            return Ok(());
        };
        let point = match action {
            Action::Click { x, y, .. } => Some((*x, *y)),
            Action::Scroll {
                x: Some(x),
                y: Some(y),
                ..
            } => Some((*x, *y)),
            _ => None,
        };
        match point {
            Some((x, y)) if x < 0 || y < 0 || x as u32 >= width || y as u32 >= height => Err(
                ActionError::InvalidAction(format!("({x}, {y}) outside {width}x{height} screen")),
            ),
            _ => Ok(()),
        }
    }
}

impl Default for FakeActionExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ActionExecutor for FakeActionExecutor {
    async fn execute(&self, action: &Action) -> Result<(), ActionError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        lock(&self.executed).push(action.clone());

        if let Some((at, token)) = &self.cancel_on_call {
            if *at == call {
                token.cancel();
            }
        }
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.check_bounds(action)?;
        match self.mode {
            FailureMode::Never => Ok(()),
            FailureMode::First(n, kind) if call <= n => Err(injected(kind)),
            FailureMode::First(..) => Ok(()),
            FailureMode::Always(kind) => Err(injected(kind)),
        }
    }
}

/// Returns a blank PNG of fixed size on every capture.
pub struct StaticScreenshotCapturer {
    width: u32,
    height: u32,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    fail_first: u32,
    captures: AtomicU32,
    frame: OnceCell<Vec<u8>>,
}

impl StaticScreenshotCapturer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            clock: Arc::new(SystemClock),
            ids: Arc::new(UlidGenerator::new(SystemClock)),
            fail_first: 0,
            captures: AtomicU32::new(0),
            frame: OnceCell::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The first `n` captures report the display as unavailable.
    pub fn fail_first(mut self, n: u32) -> Self {
        self.fail_first = n;
        self
    }

    pub fn captures(&self) -> u32 {
        self.captures.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScreenshotCapturer for StaticScreenshotCapturer {
    async fn capture(&self) -> Result<Screenshot, CaptureError> {
        let n = self.captures.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= self.fail_first {
            return Err(CaptureError::DisplayUnavailable("scripted outage".into()));
        }
        let frame = self
            .frame
            .get_or_try_init(|| async { blank_png(self.width, self.height) })
            .await?;
        Screenshot::from_png(self.ids.generate_shot_id(), frame.clone(), self.clock.now())
    }
}
