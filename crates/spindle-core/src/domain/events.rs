//! Lifecycle events emitted by the queue.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{Lane, TaskId, TaskStatus};

/// Notification delivered to every listener registered with
/// [`TaskQueue::subscribe`](crate::queue::TaskQueue::subscribe).
///
/// For a given task at most one of `TaskCompleted` / `TaskFailed` is ever
/// emitted, and it is the last event for that task.
/// `TaskTimeout` is advisory and may repeat on every watchdog scan while the
/// task keeps running past its lane timeout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum QueueEvent {
    TaskStarted {
        task_id: TaskId,
        lane: Lane,
        name: String,
    },

    TaskCompleted {
        task_id: TaskId,
        result: serde_json::Value,
    },

    /// Terminal failure. `status` is `Failed`, or `Cancelled` when the task
    /// was cancelled (while pending, or while running and then settled).
    TaskFailed {
        task_id: TaskId,
        error: String,
        status: TaskStatus,
    },

    TaskTimeout {
        task_id: TaskId,
        lane: Lane,
        runtime: Duration,
    },
}

impl QueueEvent {
    pub fn task_id(&self) -> &TaskId {
        match self {
            QueueEvent::TaskStarted { task_id, .. }
            | QueueEvent::TaskCompleted { task_id, .. }
            | QueueEvent::TaskFailed { task_id, .. }
            | QueueEvent::TaskTimeout { task_id, .. } => task_id,
        }
    }

    /// Completed or failed: no further events follow for this task.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            QueueEvent::TaskCompleted { .. } | QueueEvent::TaskFailed { .. }
        )
    }
}
