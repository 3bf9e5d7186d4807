//! Impls - port implementations.
//!
//! - **HttpModelClient**: the remote vision-action model over HTTPS
//! - **XdotoolActionExecutor**: X11 input injection
//! - **CommandScreenshotCapturer**: screenshots from an external command
//! - **scripted**: deterministic doubles for tests and dry runs

pub mod command_capture;
pub mod http_model;
pub mod scripted;
pub mod xdotool;

pub use self::command_capture::CommandScreenshotCapturer;
pub use self::http_model::HttpModelClient;
pub use self::scripted::{FakeActionExecutor, ScriptedModelClient, StaticScreenshotCapturer};
pub use self::xdotool::XdotoolActionExecutor;
