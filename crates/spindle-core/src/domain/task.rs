//! Task: what callers hand to the queue.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use super::{Lane, TaskId};
use crate::error::TaskError;
use crate::queue::TaskContext;

/// Progress callback: `(percent, message)`.
pub type ProgressFn = Arc<dyn Fn(f32, &str) + Send + Sync>;

/// The work behind a task. Invoked exactly once, when the task gets a slot.
///
/// Long-running actions should call [`TaskContext::is_cancelled`] at safe
/// points and bail out with [`TaskError::Cancelled`]; the queue never aborts
/// an action on its own.
///
/// Implemented for any `FnOnce(TaskContext) -> impl Future<...>`; see
/// [`Task::from_fn`].
#[async_trait]
pub trait TaskAction: Send + 'static {
    async fn run(self: Box<Self>, ctx: TaskContext) -> Result<serde_json::Value, TaskError>;
}

#[async_trait]
impl<F, Fut> TaskAction for F
where
    F: FnOnce(TaskContext) -> Fut + Send + 'static,
    Fut: Future<Output = Result<serde_json::Value, TaskError>> + Send + 'static,
{
    async fn run(self: Box<Self>, ctx: TaskContext) -> Result<serde_json::Value, TaskError> {
        (*self)(ctx).await
    }
}

/// A unit of work submitted to [`TaskQueue::enqueue`](crate::queue::TaskQueue::enqueue).
pub struct Task {
    pub(crate) id: TaskId,
    pub(crate) lane: Lane,
    pub(crate) name: String,
    pub(crate) action: Box<dyn TaskAction>,
    pub(crate) progress: Option<ProgressFn>,
}

impl Task {
    pub fn new(
        id: impl Into<TaskId>,
        lane: Lane,
        name: impl Into<String>,
        action: impl TaskAction,
    ) -> Self {
        Self {
            id: id.into(),
            lane,
            name: name.into(),
            action: Box::new(action),
            progress: None,
        }
    }

    /// Task whose action is an async closure.
    ///
    /// ```ignore
    /// let task = Task::from_fn("t1", Lane::Main, "probe", |ctx| async move {
    ///     ctx.report_progress(50.0, "halfway");
    ///     Ok(serde_json::json!({"ok": true}))
    /// });
    /// ```
    pub fn from_fn<F, Fut>(id: impl Into<TaskId>, lane: Lane, name: impl Into<String>, f: F) -> Self
    where
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<serde_json::Value, TaskError>> + Send + 'static,
    {
        Self::new(id, lane, name, f)
    }

    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(f32, &str) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(callback));
        self
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn lane(&self) -> Lane {
        self.lane
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("lane", &self.lane)
            .field("name", &self.name)
            .field("has_progress", &self.progress.is_some())
            .finish_non_exhaustive()
    }
}
