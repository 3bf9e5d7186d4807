//! Runtime configuration.
//!
//! Every field has a default, so a config file only needs the values it
//! changes. Precedence: defaults < JSON file < environment < CLI flags (the
//! last applied by the binary).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::export::ReportFormat;
use crate::domain::{FailurePolicy, RetryPolicy, TaskSettings, TaskerError};

pub const ENV_API_KEY: &str = "OAGI_API_KEY";
pub const ENV_BASE_URL: &str = "OAGI_BASE_URL";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub name: String,
    pub base_url: String,

    /// Never written back out.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    pub temperature: f32,
    pub request_timeout_ms: u64,
    pub retry: RetryPolicy,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            name: "lux-actor-1".to_string(),
            base_url: "https://api.agiopen.org".to_string(),
            api_key: None,
            temperature: 0.0,
            request_timeout_ms: 60_000,
            retry: RetryPolicy::model(),
        }
    }
}

impl ModelSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub save_dir: PathBuf,
    pub exp_name: String,
    pub format: ReportFormat,

    /// Write each step's screenshot next to the report.
    pub persist_screenshots: bool,

    /// Append every history event to a JSON-lines journal as it happens.
    pub journal: bool,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            save_dir: PathBuf::from("results"),
            exp_name: "tasker".to_string(),
            format: ReportFormat::Html,
            persist_screenshots: true,
            journal: true,
        }
    }
}

impl OutputSettings {
    /// `<save_dir>/<exp_name>`
    pub fn run_dir(&self) -> PathBuf {
        self.save_dir.join(&self.exp_name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskerConfig {
    pub model: ModelSettings,

    /// Step budget per todo.
    pub max_steps: u32,

    /// Recent steps of the current todo sent to the model.
    pub history_window: usize,

    pub action_retry: RetryPolicy,
    pub action_timeout_ms: u64,
    pub capture_timeout_ms: u64,
    pub failure_policy: FailurePolicy,

    /// Capture one extra screenshot after each completed todo.
    pub capture_checkpoints: bool,

    pub output: OutputSettings,
}

impl Default for TaskerConfig {
    fn default() -> Self {
        Self {
            model: ModelSettings::default(),
            max_steps: 24,
            history_window: 8,
            action_retry: RetryPolicy::actions(),
            action_timeout_ms: 10_000,
            capture_timeout_ms: 5_000,
            failure_policy: FailurePolicy::ContinueOnFailure,
            capture_checkpoints: false,
            output: OutputSettings::default(),
        }
    }
}

impl TaskerConfig {
    /// Read a JSON config file; missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TaskerError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: TaskerConfig = serde_json::from_str(&raw)?;
        Ok(config)
    }

    /// Overlay `OAGI_API_KEY` / `OAGI_BASE_URL` from the process environment.
    pub fn with_env(self) -> Self {
        self.with_env_from(|key| std::env::var(key).ok())
    }

    pub fn with_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(key) = lookup(ENV_API_KEY).filter(|k| !k.is_empty()) {
            self.model.api_key = Some(key);
        }
        if let Some(url) = lookup(ENV_BASE_URL).filter(|u| !u.is_empty()) {
            self.model.base_url = url;
        }
        self
    }

    pub fn validate(&self) -> Result<(), TaskerError> {
        if self.max_steps == 0 {
            return Err(TaskerError::Config("max_steps must be at least 1".into()));
        }
        self.action_retry
            .validate()
            .map_err(|e| TaskerError::Config(format!("action_retry: {e}")))?;
        self.model
            .retry
            .validate()
            .map_err(|e| TaskerError::Config(format!("model.retry: {e}")))?;
        if !self.model.temperature.is_finite() || self.model.temperature < 0.0 {
            return Err(TaskerError::Config(format!(
                "temperature must be a non-negative number, got {}",
                self.model.temperature
            )));
        }
        if self.model.base_url.trim().is_empty() {
            return Err(TaskerError::Config("model base_url is empty".into()));
        }
        Ok(())
    }

    pub fn task_settings(&self) -> TaskSettings {
        TaskSettings {
            max_steps: self.max_steps,
            model: self.model.name.clone(),
            failure_policy: self.failure_policy,
        }
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.action_timeout_ms)
    }

    pub fn capture_timeout(&self) -> Duration {
        Duration::from_millis(self.capture_timeout_ms)
    }
}
