use std::sync::Arc;

use async_trait::async_trait;

use super::request::MetadataRequest;
use super::runner::ProcessRunner;
use crate::domain::{Lane, Task, TaskAction, TaskId};
use crate::error::TaskError;
use crate::queue::TaskContext;

/// Metadata generation as a queue action. The task result is the
/// serialized [`ProcessResult`](super::ProcessResult).
#[derive(Debug, Clone)]
pub struct MetadataJob {
    runner: Arc<ProcessRunner>,
    request: MetadataRequest,
}

impl MetadataJob {
    pub fn new(runner: Arc<ProcessRunner>, request: MetadataRequest) -> Self {
        Self { runner, request }
    }

    pub fn request(&self) -> &MetadataRequest {
        &self.request
    }

    /// Wrap into a task on the `ai` lane.
    pub fn into_task(self, id: impl Into<TaskId>, name: impl Into<String>) -> Task {
        Task::new(id, Lane::Ai, name, self)
    }
}

#[async_trait]
impl TaskAction for MetadataJob {
    async fn run(self: Box<Self>, ctx: TaskContext) -> Result<serde_json::Value, TaskError> {
        let result = self.runner.run(&self.request, &ctx).await?;
        Ok(serde_json::to_value(result)?)
    }
}
