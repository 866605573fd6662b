use thiserror::Error;

use crate::domain::TaskId;
use crate::process::ProcessError;

/// Error returned by a task action.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("{0}")]
    Failed(String),

    /// The action noticed a cancel request and stopped.
    #[error("task cancelled")]
    Cancelled,

    #[error(transparent)]
    Process(ProcessError),
}

impl TaskError {
    pub fn failed(message: impl Into<String>) -> Self {
        TaskError::Failed(message.into())
    }
}

impl From<ProcessError> for TaskError {
    fn from(err: ProcessError) -> Self {
        match err {
            ProcessError::Cancelled => TaskError::Cancelled,
            other => TaskError::Process(other),
        }
    }
}

impl From<serde_json::Error> for TaskError {
    fn from(err: serde_json::Error) -> Self {
        TaskError::Failed(format!("result encoding: {err}"))
    }
}

/// Error surfaced by [`TaskQueue::run`](crate::queue::TaskQueue::run).
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("task {task_id} failed: {message}")]
    Failed { task_id: TaskId, message: String },

    #[error("task {task_id} cancelled: {message}")]
    Cancelled { task_id: TaskId, message: String },

    #[error("event stream closed before task {0} settled")]
    Closed(TaskId),

    #[error("task {task_id} result could not be decoded: {source}")]
    Decode {
        task_id: TaskId,
        #[source]
        source: serde_json::Error,
    },
}

impl QueueError {
    pub fn task_id(&self) -> &TaskId {
        match self {
            QueueError::Failed { task_id, .. }
            | QueueError::Cancelled { task_id, .. }
            | QueueError::Decode { task_id, .. }
            | QueueError::Closed(task_id) => task_id,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, QueueError::Cancelled { .. })
    }
}
