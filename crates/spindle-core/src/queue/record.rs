//! Bookkeeping entries for pending and running tasks.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::time::{Duration, Instant};

use crate::domain::{Lane, Task, TaskId};

/// Internal ticket number. Task ids may repeat, tickets never do.
pub(crate) type Ticket = u64;

/// A task waiting in its lane's FIFO.
#[derive(Debug)]
pub(crate) struct PendingTask {
    pub ticket: Ticket,
    pub task: Task,
    pub enqueued_at: DateTime<Utc>,
}

/// Last time a running task reported progress.
///
/// Shared between the pool entry (read by the watchdog) and the task's
/// [`TaskContext`](super::TaskContext) (written on every progress report).
#[derive(Debug, Clone)]
pub(crate) struct ActivityStamp(Arc<Mutex<Instant>>);

impl ActivityStamp {
    pub fn new(at: Instant) -> Self {
        Self(Arc::new(Mutex::new(at)))
    }

    pub fn touch(&self) {
        *self.0.lock() = Instant::now();
    }

    pub fn get(&self) -> Instant {
        *self.0.lock()
    }
}

/// A task holding a slot in its lane's pool.
#[derive(Debug)]
pub(crate) struct RunningTask {
    pub task_id: TaskId,
    pub lane: Lane,
    pub name: String,

    /// Wall-clock start, for display.
    pub started_at: DateTime<Utc>,

    /// Monotonic start, for runtime measurement.
    pub started: Instant,

    pub last_progress: ActivityStamp,
}

impl RunningTask {
    pub fn new(task_id: TaskId, lane: Lane, name: String, started_at: DateTime<Utc>) -> Self {
        let started = Instant::now();
        Self {
            task_id,
            lane,
            name,
            started_at,
            started,
            last_progress: ActivityStamp::new(started),
        }
    }

    pub fn runtime(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started)
    }

    pub fn since_progress(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_progress.get())
    }

    pub fn sample(&self, now: Instant) -> RunningSample {
        RunningSample {
            task_id: self.task_id.clone(),
            lane: self.lane,
            name: self.name.clone(),
            runtime: self.runtime(now),
            since_progress: self.since_progress(now),
        }
    }
}

/// Copy of a running task's timings, taken for one watchdog scan.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RunningSample {
    pub task_id: TaskId,
    pub lane: Lane,
    pub name: String,
    pub runtime: Duration,
    pub since_progress: Duration,
}
