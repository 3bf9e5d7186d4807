//! tasker-core
//!
//! Perception-action runtime: a task is split into todos, and each todo runs
//! a loop of screenshot, model proposal and input action until the model
//! declares it complete or failed, or its step budget runs out.
//!
//! # Modules
//! - **domain**: ids, task/todo/step, actions, errors, retry decisions, reports
//! - **ports**: seams to the outside (model, capturer, executor, clock, ids)
//! - **app**: the agent loop, action dispatch, observer, report export
//! - **impls**: HTTP model client, xdotool executor, command capturer, doubles
//! - **config**: runtime configuration

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;

pub use app::{ExecutionObserver, ReportFormat, TaskerAgent, TaskerAgentBuilder};
pub use config::TaskerConfig;
pub use domain::{Action, Report, Task, TaskerError, TodoStatus};
