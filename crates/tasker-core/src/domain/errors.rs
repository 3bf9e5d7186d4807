//! Error types and their operational classification.
//!
//! Step-level errors (`CaptureError`, `ModelError`, `ActionError`) are turned
//! into recorded steps by the agent. Only `TaskerError` leaves `run`.

use std::time::Duration;

use thiserror::Error;

/// Operational classification of a failure. Drives retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Worth retrying (target not rendered yet, network hiccup).
    Transient,
    /// Retrying cannot help (malformed parameters, unknown action).
    Permanent,
    /// The surrounding environment is broken (no display, tool missing).
    Infrastructure,
}

impl ErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Transient)
    }
}

/// Screenshot capture failures.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("display surface unavailable: {0}")]
    DisplayUnavailable(String),

    #[error("screenshot capture timed out after {0:?}")]
    Timeout(Duration),

    #[error("captured image is not a valid PNG: {0}")]
    InvalidImage(String),
}

impl CaptureError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CaptureError::DisplayUnavailable(_) => ErrorKind::Infrastructure,
            CaptureError::Timeout(_) => ErrorKind::Transient,
            CaptureError::InvalidImage(_) => ErrorKind::Permanent,
        }
    }
}

/// Model round-trip failures.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model request timed out")]
    Timeout,

    #[error("model unreachable: {0}")]
    Unreachable(String),

    #[error("model rejected request (status {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("malformed model response: {0}")]
    Malformed(String),
}

impl ModelError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ModelError::Timeout | ModelError::Unreachable(_) => ErrorKind::Transient,
            ModelError::Rejected { status, .. } if *status >= 500 || *status == 429 => {
                ErrorKind::Transient
            }
            ModelError::Rejected { .. } | ModelError::Malformed(_) => ErrorKind::Permanent,
        }
    }
}

/// Action execution failures.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("invalid action: {0}")]
    InvalidAction(String),

    #[error("action failed: {0}")]
    Failed(String),

    #[error("action timed out after {0:?}")]
    Timeout(Duration),

    #[error("input backend unavailable: {0}")]
    Unavailable(String),
}

impl ActionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ActionError::InvalidAction(_) => ErrorKind::Permanent,
            ActionError::Failed(_) | ActionError::Timeout(_) => ErrorKind::Transient,
            ActionError::Unavailable(_) => ErrorKind::Infrastructure,
        }
    }
}

/// Errors that escape a run or its setup.
#[derive(Debug, Error)]
pub enum TaskerError {
    #[error("model unreachable after {attempts} attempts: {source}")]
    ModelUnreachable {
        attempts: u32,
        #[source]
        source: ModelError,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid todo transition: {from} -> {to}")]
    InvalidTransition { from: &'static str, to: &'static str },

    #[error("step index {got} out of order (expected {expected})")]
    StepIndex { expected: u32, got: u32 },

    #[error("agent is missing required component: {0}")]
    Build(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}
