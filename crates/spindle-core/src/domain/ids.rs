//! Task identifiers.
//!
//! Ids are caller-supplied strings: the desktop front-end correlates its own
//! job rows with queue events through them. Nothing in the queue enforces
//! uniqueness; two tasks enqueued under the same id are tracked independently.
//!
//! Callers without an id of their own use [`TaskId::generate`] (or an
//! [`IdGenerator`](crate::ports::IdGenerator)), which yields a
//! time-sortable `task-<ULID>` string.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use ulid::Ulid;

const GENERATED_PREFIX: &str = "task-";

/// Identifier of a queued task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Fresh `task-<ULID>` id from the system clock.
    pub fn generate() -> Self {
        Self::from(Ulid::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<Ulid> for TaskId {
    fn from(ulid: Ulid) -> Self {
        Self(format!("{GENERATED_PREFIX}{ulid}"))
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for TaskId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_carry_prefix_and_differ() {
        let a = TaskId::generate();
        let b = TaskId::generate();

        assert!(a.as_str().starts_with("task-"));
        assert_ne!(a, b);
    }

    #[test]
    fn ulid_ids_are_sortable() {
        let id1 = TaskId::from(Ulid::new());
        std::thread::sleep(std::time::Duration::from_millis(2));
        let id2 = TaskId::from(Ulid::new());

        assert!(id1 < id2);
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = TaskId::new("video-42");
        let s = serde_json::to_string(&id).unwrap();
        assert_eq!(s, "\"video-42\"");

        let back: TaskId = serde_json::from_str(&s).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn can_be_looked_up_by_str() {
        let mut set = std::collections::HashSet::new();
        set.insert(TaskId::new("abc"));
        assert!(set.contains("abc"));
    }
}
