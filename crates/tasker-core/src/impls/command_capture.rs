//! Screenshot capture by running an external command that writes PNG bytes
//! to stdout (ImageMagick `import` by default).

use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;

use crate::domain::{CaptureError, Screenshot};
use crate::ports::{Clock, IdGenerator, ScreenshotCapturer};

pub struct CommandScreenshotCapturer {
    program: String,
    args: Vec<String>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl CommandScreenshotCapturer {
    /// `import -window root png:-`
    pub fn new(clock: Arc<dyn Clock>, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            program: "import".to_string(),
            args: vec!["-window".into(), "root".into(), "png:-".into()],
            clock,
            ids,
        }
    }

    pub fn with_command<I, S>(mut self, program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.program = program.into();
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

#[async_trait]
impl ScreenshotCapturer for CommandScreenshotCapturer {
    async fn capture(&self) -> Result<Screenshot, CaptureError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| CaptureError::DisplayUnavailable(format!("{}: {e}", self.program)))?;
        if !output.status.success() {
            return Err(CaptureError::DisplayUnavailable(format!(
                "{} exited with {}: {}",
                self.program,
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Screenshot::from_png(self.ids.generate_shot_id(), output.stdout, self.clock.now())
    }
}
