//! Point-in-time views of the queue.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{Lane, TaskId, TaskStatus};

/// Occupancy of one lane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaneStatus {
    pub lane: Lane,
    pub running: usize,
    pub pending: usize,
    pub limit: usize,
}

/// A task currently holding a slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveTask {
    pub task_id: TaskId,
    pub lane: Lane,
    pub name: String,
    pub started_at: DateTime<Utc>,
}

/// Snapshot returned by [`TaskQueue::status`](super::TaskQueue::status).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub lanes: Vec<LaneStatus>,
    pub active_tasks: Vec<ActiveTask>,
}

impl QueueStatus {
    pub fn lane(&self, lane: Lane) -> Option<&LaneStatus> {
        self.lanes.iter().find(|s| s.lane == lane)
    }

    pub fn is_idle(&self) -> bool {
        self.lanes.iter().all(|s| s.running == 0 && s.pending == 0)
    }

    pub fn active_names(&self) -> impl Iterator<Item = &str> {
        self.active_tasks.iter().map(|t| t.name.as_str())
    }
}

/// Status of a single task that has not yet settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskView {
    pub task_id: TaskId,
    pub lane: Lane,
    pub name: String,
    pub status: TaskStatus,
    pub enqueued_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_for_dashboards() {
        let status = QueueStatus {
            lanes: vec![
                LaneStatus { lane: Lane::Main, running: 2, pending: 0, limit: 5 },
                LaneStatus { lane: Lane::Ai, running: 1, pending: 3, limit: 1 },
            ],
            active_tasks: vec![],
        };

        let v = serde_json::to_value(&status).unwrap();
        assert_eq!(v["lanes"][1]["lane"], "ai");
        assert_eq!(v["lanes"][1]["pending"], 3);
        assert_eq!(status.lane(Lane::Main).map(|s| s.running), Some(2));
        assert!(!status.is_idle());
    }
}
