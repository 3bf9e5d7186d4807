//! Clock port - time source abstraction.
//!
//! Every timestamp in steps, events and reports comes from a `Clock`, so a
//! `FixedClock` makes whole runs reproducible in tests.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

/// Clock は現在時刻を提供
///
/// # テスト容易性
/// - trait により時刻を差し替え可能
/// - テストでは `FixedClock` を使用し、レポートの時刻を固定する
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Returns the same instant, optionally advancing by `tick` on every read.
#[derive(Debug)]
pub struct FixedClock {
    current: Mutex<DateTime<Utc>>,
    tick: Duration,
}

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            current: Mutex::new(at),
            tick: Duration::zero(),
        }
    }

    /// Advance by `tick` after each `now()`.
    pub fn ticking(at: DateTime<Utc>, tick: Duration) -> Self {
        Self {
            current: Mutex::new(at),
            tick,
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        let mut current = self.current.lock().unwrap_or_else(|p| p.into_inner());
        let now = *current;
        *current = now + self.tick;
        now
    }
}
