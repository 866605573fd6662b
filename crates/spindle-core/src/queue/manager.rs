//! The queue manager: lanes, scheduling, settlement, cancellation.
//!
//! All state sits behind one lock that is never held across an `.await`.
//! Scheduling is edge-triggered: a pass runs inside `enqueue` and inside every
//! settlement, visiting lanes in [`Lane::ALL`] order and starting FIFO-first
//! pending tasks while their lane has free slots.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use tokio::runtime::Handle;
use tokio::task::JoinError;
use tokio::time::Instant;

use super::bus::{EventBus, EventSubscription};
use super::context::TaskContext;
use super::lanes::LaneState;
use super::record::{PendingTask, RunningSample, RunningTask, Ticket};
use super::status::{ActiveTask, LaneStatus, QueueStatus, TaskView};
use crate::config::QueueConfig;
use crate::domain::{Lane, QueueEvent, Task, TaskAction, TaskId, TaskStatus};
use crate::error::QueueError;
use crate::ports::Clock;

const CANCELLED_PENDING: &str = "cancelled before start";
const CANCELLED_BY_CLEAR: &str = "queue cleared";
const CANCELLED_RUNNING: &str = "cancelled while running";

struct QueueState {
    main: LaneState,
    ai: LaneState,

    /// Ids with an outstanding cancel request.
    cancelled: HashSet<TaskId>,

    bus: EventBus,
    next_ticket: Ticket,
}

impl QueueState {
    fn new(config: &QueueConfig) -> Self {
        Self {
            main: LaneState::new(config.main.max_concurrent),
            ai: LaneState::new(config.ai.max_concurrent),
            cancelled: HashSet::new(),
            bus: EventBus::default(),
            next_ticket: 0,
        }
    }

    fn lane(&self, lane: Lane) -> &LaneState {
        match lane {
            Lane::Main => &self.main,
            Lane::Ai => &self.ai,
        }
    }

    fn lane_mut(&mut self, lane: Lane) -> &mut LaneState {
        match lane {
            Lane::Main => &mut self.main,
            Lane::Ai => &mut self.ai,
        }
    }

    fn allocate_ticket(&mut self) -> Ticket {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        ticket
    }

    fn is_running(&self, task_id: &TaskId) -> bool {
        Lane::ALL
            .iter()
            .any(|&lane| self.lane(lane).running().any(|r| &r.task_id == task_id))
    }

    fn emit_cancelled(&mut self, task_id: TaskId, reason: &str) {
        debug_assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Cancelled));
        self.bus.emit(QueueEvent::TaskFailed {
            task_id,
            error: reason.to_string(),
            status: TaskStatus::Cancelled,
        });
    }
}

pub(crate) struct Shared {
    state: Mutex<QueueState>,
    clock: Arc<dyn Clock>,
    config: QueueConfig,
    runtime: Handle,
}

impl Shared {
    pub(crate) fn is_cancelled(&self, task_id: &TaskId) -> bool {
        self.state.lock().cancelled.contains(task_id)
    }
}

/// Bounded two-lane task queue.
///
/// Clone the handle to share it; all clones drive the same queue. Built with
/// [`QueueBuilder`](crate::app::QueueBuilder).
#[derive(Clone)]
pub struct TaskQueue {
    shared: Arc<Shared>,
}

impl TaskQueue {
    pub(crate) fn new(config: QueueConfig, clock: Arc<dyn Clock>, runtime: Handle) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState::new(&config)),
                clock,
                config,
                runtime,
            }),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.shared.config
    }

    pub(crate) fn runtime(&self) -> &Handle {
        &self.shared.runtime
    }

    /// Queue a task on its lane and start whatever fits. Never blocks on the
    /// task itself.
    pub fn enqueue(&self, task: Task) -> TaskId {
        let task_id = task.id().clone();
        let lane = task.lane();
        let enqueued_at = self.shared.clock.now();

        let mut state = self.shared.state.lock();
        // A request left over for an id with nothing running belongs to an
        // earlier task, not this one.
        if !state.is_running(&task_id) && state.cancelled.remove(&task_id) {
            tracing::debug!(task_id = %task_id, "stale cancel request dropped");
        }
        let ticket = state.allocate_ticket();
        tracing::debug!(task_id = %task_id, lane = %lane, name = task.name(), "task enqueued");
        state.lane_mut(lane).push(PendingTask {
            ticket,
            task,
            enqueued_at,
        });
        schedule(&self.shared, &mut state);

        task_id
    }

    /// Request cancellation.
    ///
    /// Pending entries with this id are dropped and reported as cancelled.
    /// A running task only gets the request recorded; it must notice it via
    /// [`TaskContext::is_cancelled`]. Unknown ids are recorded too, until a
    /// new task with that id is enqueued. Always returns `true`.
    pub fn cancel(&self, task_id: &TaskId) -> bool {
        let mut state = self.shared.state.lock();

        let mut removed = 0usize;
        for lane in Lane::ALL {
            for entry in state.lane_mut(lane).remove_pending(task_id) {
                removed += 1;
                state.emit_cancelled(entry.task.id, CANCELLED_PENDING);
            }
        }

        let running = state.is_running(task_id);
        if running || removed == 0 {
            state.cancelled.insert(task_id.clone());
        }

        tracing::info!(task_id = %task_id, removed, running, "cancel requested");
        true
    }

    pub fn is_cancelled(&self, task_id: &TaskId) -> bool {
        self.shared.is_cancelled(task_id)
    }

    /// Drop every pending task and ask every running task to stop.
    ///
    /// Pending queues are empty when this returns; running tasks settle on
    /// their own.
    pub fn clear_all(&self) {
        let mut state = self.shared.state.lock();

        let mut dropped = 0usize;
        let mut signalled = 0usize;
        for lane in Lane::ALL {
            for entry in state.lane_mut(lane).drain_pending() {
                dropped += 1;
                state.emit_cancelled(entry.task.id, CANCELLED_BY_CLEAR);
            }
            let running: Vec<TaskId> = state
                .lane(lane)
                .running()
                .map(|r| r.task_id.clone())
                .collect();
            signalled += running.len();
            state.cancelled.extend(running);
        }

        tracing::info!(dropped, signalled, "queue cleared");
    }

    pub fn status(&self) -> QueueStatus {
        let guard = self.shared.state.lock();
        let state = &*guard;

        let lanes = Lane::ALL
            .iter()
            .map(|&lane| {
                let l = state.lane(lane);
                LaneStatus {
                    lane,
                    running: l.running_len(),
                    pending: l.pending_len(),
                    limit: l.limit(),
                }
            })
            .collect();

        let mut active_tasks: Vec<ActiveTask> = Lane::ALL
            .iter()
            .flat_map(move |&lane| state.lane(lane).running())
            .map(|r| ActiveTask {
                task_id: r.task_id.clone(),
                lane: r.lane,
                name: r.name.clone(),
                started_at: r.started_at,
            })
            .collect();
        active_tasks.sort_by_key(|t| t.started_at);

        QueueStatus {
            lanes,
            active_tasks,
        }
    }

    /// Where a task currently is. `None` once it has settled or if the id
    /// was never enqueued.
    pub fn task_status(&self, task_id: &TaskId) -> Option<TaskView> {
        let state = self.shared.state.lock();

        for lane in Lane::ALL {
            if let Some(r) = state.lane(lane).running().find(|r| &r.task_id == task_id) {
                return Some(TaskView {
                    task_id: r.task_id.clone(),
                    lane,
                    name: r.name.clone(),
                    status: TaskStatus::Running,
                    enqueued_at: None,
                    started_at: Some(r.started_at),
                });
            }
        }
        for lane in Lane::ALL {
            if let Some(p) = state.lane(lane).pending().find(|p| p.task.id() == task_id) {
                return Some(TaskView {
                    task_id: p.task.id().clone(),
                    lane,
                    name: p.task.name().to_string(),
                    status: TaskStatus::Pending,
                    enqueued_at: Some(p.enqueued_at),
                    started_at: None,
                });
            }
        }
        None
    }

    /// Register a listener. Drop the subscription to unsubscribe.
    pub fn subscribe(&self) -> EventSubscription {
        self.shared.state.lock().bus.subscribe()
    }

    /// Enqueue and wait for the task to settle.
    ///
    /// Resolves with the action's result, or with the failure or
    /// cancellation reported by the queue.
    pub async fn run(&self, task: Task) -> Result<serde_json::Value, QueueError> {
        let mut events = self.subscribe();
        let task_id = self.enqueue(task);
        events.wait_for(&task_id).await
    }

    /// [`run`](Self::run), decoding the result as `T`.
    pub async fn run_as<T: DeserializeOwned>(&self, task: Task) -> Result<T, QueueError> {
        let mut events = self.subscribe();
        let task_id = self.enqueue(task);
        events.wait_for_as(&task_id).await
    }

    pub(crate) fn running_samples(&self) -> Vec<RunningSample> {
        let now = Instant::now();
        let guard = self.shared.state.lock();
        let state = &*guard;
        Lane::ALL
            .iter()
            .flat_map(move |&lane| state.lane(lane).running())
            .map(|r| r.sample(now))
            .collect()
    }

    pub(crate) fn emit(&self, event: QueueEvent) {
        self.shared.state.lock().bus.emit(event);
    }
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}

/// Start pending tasks while their lanes have room.
fn schedule(shared: &Arc<Shared>, state: &mut QueueState) {
    for lane in Lane::ALL {
        while let Some(next) = state.lane_mut(lane).pop_startable() {
            start(shared, state, lane, next);
        }
    }
}

fn start(shared: &Arc<Shared>, state: &mut QueueState, lane: Lane, pending: PendingTask) {
    let PendingTask { ticket, task, .. } = pending;
    let Task {
        id,
        name,
        action,
        progress,
        ..
    } = task;

    let running = RunningTask::new(id.clone(), lane, name.clone(), shared.clock.now());
    let ctx = TaskContext::new(
        id.clone(),
        lane,
        name.clone(),
        Arc::clone(shared),
        running.last_progress.clone(),
        progress,
    );
    state.lane_mut(lane).insert_running(ticket, running);

    tracing::info!(task_id = %id, lane = %lane, name = %name, "task started");
    state.bus.emit(QueueEvent::TaskStarted {
        task_id: id,
        lane,
        name,
    });

    shared
        .runtime
        .spawn(execute(Arc::clone(shared), lane, ticket, action, ctx));
}

async fn execute(
    shared: Arc<Shared>,
    lane: Lane,
    ticket: Ticket,
    action: Box<dyn TaskAction>,
    ctx: TaskContext,
) {
    // Inner spawn turns a panicking action into a JoinError.
    let outcome = match shared.runtime.spawn(action.run(ctx)).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(err.to_string()),
        Err(err) => Err(join_failure(err)),
    };
    settle(&shared, lane, ticket, outcome);
}

fn join_failure(err: JoinError) -> String {
    if !err.is_panic() {
        return "task aborted".to_string();
    }
    let payload = err.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    format!("task panicked: {message}")
}

/// Record the terminal state of a running task. A second call for the same
/// ticket is a no-op.
fn settle(
    shared: &Arc<Shared>,
    lane: Lane,
    ticket: Ticket,
    outcome: Result<serde_json::Value, String>,
) {
    let ended_at = shared.clock.now();
    let mut state = shared.state.lock();

    let Some(running) = state.lane_mut(lane).remove_running(ticket) else {
        return;
    };
    let cancel_requested = state.cancelled.remove(&running.task_id);
    let runtime = running.runtime(Instant::now());
    let task_id = running.task_id;

    let next = match (&outcome, cancel_requested) {
        (_, true) => TaskStatus::Cancelled,
        (Ok(_), false) => TaskStatus::Completed,
        (Err(_), false) => TaskStatus::Failed,
    };
    debug_assert!(TaskStatus::Running.can_transition_to(next));

    let event = match (outcome, cancel_requested) {
        (Ok(_), true) => {
            tracing::info!(task_id = %task_id, lane = %lane, ?runtime, %ended_at, "task cancelled after finishing");
            QueueEvent::TaskFailed {
                task_id,
                error: CANCELLED_RUNNING.to_string(),
                status: TaskStatus::Cancelled,
            }
        }
        (Err(error), true) => {
            tracing::info!(task_id = %task_id, lane = %lane, ?runtime, %ended_at, "task cancelled");
            QueueEvent::TaskFailed {
                task_id,
                error,
                status: TaskStatus::Cancelled,
            }
        }
        (Ok(result), false) => {
            tracing::info!(task_id = %task_id, lane = %lane, ?runtime, %ended_at, "task completed");
            QueueEvent::TaskCompleted { task_id, result }
        }
        (Err(error), false) => {
            tracing::warn!(task_id = %task_id, lane = %lane, ?runtime, %ended_at, error = %error, "task failed");
            QueueEvent::TaskFailed {
                task_id,
                error,
                status: TaskStatus::Failed,
            }
        }
    };

    state.bus.emit(event);
    schedule(shared, &mut state);
}
