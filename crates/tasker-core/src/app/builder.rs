//! TaskerAgentBuilder - wiring and fail-fast validation.
//!
//! The three external capabilities (model, capturer, executor) have no
//! sensible default and must be supplied; everything else falls back to
//! in-memory or wall-clock implementations.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::app::agent::{AgentSettings, TaskerAgent};
use crate::app::dispatch::ActionDispatcher;
use crate::app::observer::ExecutionObserver;
use crate::config::TaskerConfig;
use crate::domain::{RetryDecider, RetryPolicy, TaskerError};
use crate::ports::{
    ActionExecutor, Clock, IdGenerator, ModelClient, ScreenshotCapturer, SystemClock,
    UlidGenerator,
};

/// # Example
/// ```ignore
/// let agent = TaskerAgentBuilder::new()
///     .model_client(Arc::new(model))
///     .capturer(Arc::new(capturer))
///     .executor(Arc::new(executor))
///     .with_config(&config)
///     .build()?;
/// ```
pub struct TaskerAgentBuilder {
    model: Option<Arc<dyn ModelClient>>,
    capturer: Option<Arc<dyn ScreenshotCapturer>>,
    executor: Option<Arc<dyn ActionExecutor>>,
    observer: Option<Arc<ExecutionObserver>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    action_retry: RetryPolicy,
    model_retry: RetryPolicy,
    action_timeout: Duration,
    settings: AgentSettings,
    cancel: Option<CancellationToken>,
}

impl TaskerAgentBuilder {
    pub fn new() -> Self {
        Self {
            model: None,
            capturer: None,
            executor: None,
            observer: None,
            clock: None,
            ids: None,
            action_retry: RetryPolicy::actions(),
            model_retry: RetryPolicy::model(),
            action_timeout: Duration::from_secs(10),
            settings: AgentSettings::default(),
            cancel: None,
        }
    }

    pub fn model_client(mut self, model: Arc<dyn ModelClient>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn capturer(mut self, capturer: Arc<dyn ScreenshotCapturer>) -> Self {
        self.capturer = Some(capturer);
        self
    }

    pub fn executor(mut self, executor: Arc<dyn ActionExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn observer(mut self, observer: Arc<ExecutionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn action_retry(mut self, policy: RetryPolicy) -> Self {
        self.action_retry = policy;
        self
    }

    pub fn model_retry(mut self, policy: RetryPolicy) -> Self {
        self.model_retry = policy;
        self
    }

    pub fn action_timeout(mut self, timeout: Duration) -> Self {
        self.action_timeout = timeout;
        self
    }

    pub fn settings(mut self, settings: AgentSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Take retry policies, timeouts and loop settings from `config`.
    pub fn with_config(mut self, config: &TaskerConfig) -> Self {
        self.action_retry = config.action_retry.clone();
        self.model_retry = config.model.retry.clone();
        self.action_timeout = config.action_timeout();
        self.settings = AgentSettings {
            history_window: config.history_window,
            capture_timeout: config.capture_timeout(),
            model_timeout: config.model.request_timeout(),
            capture_checkpoints: config.capture_checkpoints,
        };
        self
    }

    /// # Errors
    /// `TaskerError::Build` naming the first missing component, or
    /// `TaskerError::Config` for a retry policy that fails `RetryPolicy::validate`.
    pub fn build(self) -> Result<TaskerAgent, TaskerError> {
        let model = self.model.ok_or(TaskerError::Build("model_client"))?;
        let capturer = self.capturer.ok_or(TaskerError::Build("capturer"))?;
        let executor = self.executor.ok_or(TaskerError::Build("executor"))?;
        self.action_retry
            .validate()
            .map_err(|e| TaskerError::Config(format!("action_retry: {e}")))?;
        self.model_retry
            .validate()
            .map_err(|e| TaskerError::Config(format!("model_retry: {e}")))?;

        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids: Arc<dyn IdGenerator> = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(SystemClock)));
        let dispatcher = ActionDispatcher::new(
            executor,
            Arc::new(RetryDecider::new(self.action_retry)),
            Arc::clone(&clock),
            self.action_timeout,
        );

        Ok(TaskerAgent {
            model,
            capturer,
            dispatcher,
            model_decider: Arc::new(RetryDecider::new(self.model_retry)),
            observer: self
                .observer
                .unwrap_or_else(|| Arc::new(ExecutionObserver::new())),
            clock,
            ids,
            settings: self.settings,
            cancel: self.cancel.unwrap_or_default(),
        })
    }
}

impl Default for TaskerAgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}
