//! Domain identifiers (strongly-typed IDs).
//!
//! IDs are ULIDs wrapped in a phantom-typed `Id<T>`: one generic
//! implementation, but a `RunId` can never be passed where a `TodoId` is
//! expected. ULIDs sort by creation time, which keeps journal files and
//! screenshot names in capture order.
//!
//! # 学習ポイント
//! - PhantomData による型安全な ID（実行時コストなし）
//! - 表示・シリアライズ時は `run-` / `todo-` / `shot-` の接頭辞付き文字列

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// Marker trait providing the display prefix of each ID kind.
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// Generic ULID-backed identifier.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

// Serialized as the prefixed string so reports stay readable.
impl<T: IdMarker> Serialize for Id<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de, T: IdMarker> Deserialize<'de> for Id<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let body = raw.strip_prefix(T::prefix()).unwrap_or(&raw);
        Ulid::from_string(body)
            .map(Self::from_ulid)
            .map_err(serde::de::Error::custom)
    }
}

/// Marker for a task run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Run {}

impl IdMarker for Run {
    fn prefix() -> &'static str {
        "run-"
    }
}

/// Marker for a todo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Todo {}

impl IdMarker for Todo {
    fn prefix() -> &'static str {
        "todo-"
    }
}

/// Marker for a captured screenshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Shot {}

impl IdMarker for Shot {
    fn prefix() -> &'static str {
        "shot-"
    }
}

/// Identifier of one `TaskerAgent::run` invocation.
pub type RunId = Id<Run>;

/// Identifier of a todo within a task.
pub type TodoId = Id<Todo>;

/// Identifier of a screenshot taken during a step.
pub type ShotId = Id<Shot>;
