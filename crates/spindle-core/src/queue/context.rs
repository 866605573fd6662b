use std::fmt;
use std::sync::Arc;

use super::manager::Shared;
use super::record::ActivityStamp;
use crate::domain::{Lane, ProgressFn, TaskId};

/// Handle given to a running action.
///
/// Carries the task's identity, the cancellation check, and the progress
/// reporter. Cheap to clone.
#[derive(Clone)]
pub struct TaskContext {
    task_id: TaskId,
    lane: Lane,
    name: String,
    shared: Arc<Shared>,
    activity: ActivityStamp,
    progress: Option<ProgressFn>,
}

impl TaskContext {
    pub(crate) fn new(
        task_id: TaskId,
        lane: Lane,
        name: String,
        shared: Arc<Shared>,
        activity: ActivityStamp,
        progress: Option<ProgressFn>,
    ) -> Self {
        Self {
            task_id,
            lane,
            name,
            shared,
            activity,
            progress,
        }
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn lane(&self) -> Lane {
        self.lane
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether someone asked this task to stop. Check at safe points.
    pub fn is_cancelled(&self) -> bool {
        self.shared.is_cancelled(&self.task_id)
    }

    /// Refresh the activity stamp seen by the watchdog, then forward to the
    /// caller's progress callback if there is one.
    pub fn report_progress(&self, percent: f32, message: &str) {
        self.activity.touch();
        tracing::trace!(task_id = %self.task_id, percent, msg = message, "progress");
        if let Some(callback) = &self.progress {
            callback(percent, message);
        }
    }
}

impl fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("task_id", &self.task_id)
            .field("lane", &self.lane)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
