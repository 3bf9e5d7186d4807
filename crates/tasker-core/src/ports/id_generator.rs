//! IdGenerator port - ID generation abstraction.
//!
//! ULIDs are built from the injected `Clock`, so ids share the timeline of
//! the timestamps they sit next to.

use crate::domain::ids::{RunId, ShotId, TodoId};
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator は run / todo / screenshot の ID を発行
///
/// # テスト容易性
/// - 注入した `Clock` から ULID を作るので、`FixedClock` と組み合わせると
///   同じ時刻の ID が並ぶ
pub trait IdGenerator: Send + Sync {
    fn generate_run_id(&self) -> RunId;

    fn generate_todo_id(&self) -> TodoId;

    fn generate_shot_id(&self) -> ShotId;
}

/// ULID-based generator.
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_run_id(&self) -> RunId {
        RunId::from(self.next())
    }

    fn generate_todo_id(&self) -> TodoId {
        TodoId::from(self.next())
    }

    fn generate_shot_id(&self) -> ShotId {
        ShotId::from(self.next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{FixedClock, SystemClock};
    use chrono::{TimeZone, Utc};

    #[test]
    fn ulid_generator_generates_unique_ids() {
        let id_gen = UlidGenerator::new(SystemClock);

        let id1 = id_gen.generate_todo_id();
        let id2 = id_gen.generate_todo_id();

        assert_ne!(id1, id2);
    }

    #[test]
    fn fixed_clock_pins_the_timestamp_part() {
        let fixed_time = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let id_gen = UlidGenerator::new(FixedClock::new(fixed_time));

        let id1 = id_gen.generate_shot_id();
        let id2 = id_gen.generate_shot_id();

        // random part still differs
        assert_ne!(id1, id2);
        assert_eq!(id1.as_ulid().timestamp_ms(), fixed_time.timestamp_millis() as u64);
        assert_eq!(id2.as_ulid().timestamp_ms(), fixed_time.timestamp_millis() as u64);
    }

    #[test]
    fn different_id_types_are_generated() {
        let id_gen = UlidGenerator::new(SystemClock);

        assert!(id_gen.generate_run_id().to_string().starts_with("run-"));
        assert!(id_gen.generate_todo_id().to_string().starts_with("todo-"));
        assert!(id_gen.generate_shot_id().to_string().starts_with("shot-"));
    }
}
