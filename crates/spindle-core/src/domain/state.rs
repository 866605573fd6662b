//! Task status state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a queued task.
///
/// State transitions:
/// - Pending -> Running -> Completed
/// - Pending -> Running -> Failed
/// - Pending -> Running -> Cancelled (settled after a cancel request)
/// - Pending -> Cancelled
///
/// Completed, Failed and Cancelled are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting in its lane's queue.
    Pending,

    /// Holding a slot in its lane's pool.
    Running,

    Completed,

    Failed,

    Cancelled,
}

impl TaskStatus {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Whether `self -> next` is an edge of the state machine.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}
