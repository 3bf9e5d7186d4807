//! Ports - the seams to everything outside the agent loop.
//!
//! Each trait hides one external capability so tests can swap in a
//! deterministic double (see `impls::scripted`).

pub mod capture;
pub mod clock;
pub mod executor;
pub mod id_generator;
pub mod model;

pub use self::capture::ScreenshotCapturer;
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::executor::ActionExecutor;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::model::{ModelClient, ModelContext, TodoDigest};
