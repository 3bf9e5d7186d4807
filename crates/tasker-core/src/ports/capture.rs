//! ScreenshotCapturer port - perception input.

use async_trait::async_trait;

use crate::domain::{CaptureError, Screenshot};

/// Produces a fresh image of the current screen.
///
/// No caching: every call reflects the screen at call time. Implementations
/// must not block the runtime (spawn processes, don't wait on them
/// synchronously).
#[async_trait]
pub trait ScreenshotCapturer: Send + Sync {
    async fn capture(&self) -> Result<Screenshot, CaptureError>;
}
