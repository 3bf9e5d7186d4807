//! Application layer: the agent loop and what it drives.

pub mod agent;
pub mod builder;
pub mod dispatch;
pub mod export;
pub mod observer;

pub use agent::{AgentSettings, RUN_CANCELLED, SKIPPED_AFTER_FAILURE, TaskerAgent};
pub use builder::TaskerAgentBuilder;
pub use dispatch::{ActionDispatcher, DispatchOutcome};
pub use export::{ReportFormat, render_html, render_json, report_path, write_report};
pub use observer::ExecutionObserver;
