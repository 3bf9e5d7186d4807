//! X11 input injection through the `xdotool` binary.

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::domain::{Action, ActionError, MouseButton};
use crate::ports::ActionExecutor;

const TYPE_DELAY_MS: u32 = 12;

pub struct XdotoolActionExecutor {
    binary: String,
    screen: OnceCell<(u32, u32)>,
}

impl XdotoolActionExecutor {
    pub fn new() -> Self {
        Self {
            binary: "xdotool".to_string(),
            screen: OnceCell::new(),
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Fix the screen size instead of asking `xdotool getdisplaygeometry`.
    pub fn with_screen(self, width: u32, height: u32) -> Self {
        Self {
            screen: OnceCell::new_with(Some((width, height))),
            ..self
        }
    }

    async fn screen(&self) -> Result<(u32, u32), ActionError> {
        self.screen
            .get_or_try_init(|| async {
                let stdout = self.invoke(&["getdisplaygeometry".to_string()]).await?;
                parse_geometry(&stdout).ok_or_else(|| {
                    ActionError::Unavailable(format!("unexpected display geometry '{}'", stdout.trim()))
                })
            })
            .await
            .copied()
    }

    async fn invoke(&self, args: &[String]) -> Result<String, ActionError> {
        debug!(binary = %self.binary, ?args, "spawning input command");
        let output = Command::new(&self.binary)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    ActionError::Unavailable(format!("{} not found on PATH", self.binary))
                }
                _ => ActionError::Unavailable(format!("failed to spawn {}: {e}", self.binary)),
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ActionError::Failed(format!(
                "{} exited with {}: {}",
                self.binary,
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for XdotoolActionExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ActionExecutor for XdotoolActionExecutor {
    async fn execute(&self, action: &Action) -> Result<(), ActionError> {
        if let Action::Wait { duration_ms } = action {
            tokio::time::sleep(Duration::from_millis(*duration_ms)).await;
            return Ok(());
        }
        if let Some((x, y)) = pointer_target(action) {
            let (width, height) = self.screen().await?;
            if x < 0 || y < 0 || x as u32 >= width || y as u32 >= height {
                return Err(ActionError::InvalidAction(format!(
                    "({x}, {y}) outside {width}x{height} screen"
                )));
            }
        }
        let args = xdotool_args(action)?;
        self.invoke(&args).await.map(|_| ())
    }
}

fn pointer_target(action: &Action) -> Option<(i32, i32)> {
    match action {
        Action::Click { x, y, .. } => Some((*x, *y)),
        Action::Scroll {
            x: Some(x),
            y: Some(y),
            ..
        } => Some((*x, *y)),
        _ => None,
    }
}

fn parse_geometry(stdout: &str) -> Option<(u32, u32)> {
    let mut parts = stdout.split_whitespace();
    let width = parts.next()?.parse().ok()?;
    let height = parts.next()?.parse().ok()?;
    Some((width, height))
}

fn button_number(button: MouseButton) -> &'static str {
    match button {
        MouseButton::Left => "1",
        MouseButton::Middle => "2",
        MouseButton::Right => "3",
    }
}

/// One chained xdotool invocation for `action`.
pub fn xdotool_args(action: &Action) -> Result<Vec<String>, ActionError> {
    let mut args: Vec<String> = Vec::new();
    match action {
        Action::Click {
            x,
            y,
            button,
            double,
        } => {
            args.extend(["mousemove".into(), x.to_string(), y.to_string(), "click".into()]);
            if *double {
                args.extend(["--repeat".into(), "2".into()]);
            }
            args.push(button_number(*button).into());
        }
        Action::TypeText { text } => {
            args.extend([
                "type".into(),
                "--delay".into(),
                TYPE_DELAY_MS.to_string(),
                "--".into(),
                text.clone(),
            ]);
        }
        Action::KeyPress { keys } => {
            args.extend(["key".into(), "--".into(), keys.join("+")]);
        }
        Action::Scroll { x, y, dx, dy } => {
            if let (Some(x), Some(y)) = (x, y) {
                args.extend(["mousemove".into(), x.to_string(), y.to_string()]);
            }
            // wheel buttons: 4 up, 5 down, 6 left, 7 right
            for (delta, negative, positive) in [(*dy, "4", "5"), (*dx, "6", "7")] {
                if delta != 0 {
                    let button = if delta < 0 { negative } else { positive };
                    args.extend([
                        "click".into(),
                        "--repeat".into(),
                        delta.unsigned_abs().to_string(),
                        button.into(),
                    ]);
                }
            }
        }
        other => {
            return Err(ActionError::InvalidAction(format!(
                "'{}' cannot be executed as input",
                other.kind_name()
            )));
        }
    }
    Ok(args)
}
