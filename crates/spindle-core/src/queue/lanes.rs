//! Per-lane pending queue and running pool.

use std::collections::{HashMap, VecDeque};

use super::record::{PendingTask, RunningTask, Ticket};
use crate::domain::TaskId;

/// One lane: FIFO of waiting tasks plus a pool bounded by `limit`.
///
/// Invariant: a ticket is in at most one of `pending` / `running`.
#[derive(Debug)]
pub(crate) struct LaneState {
    limit: usize,
    pending: VecDeque<PendingTask>,
    running: HashMap<Ticket, RunningTask>,
}

impl LaneState {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            pending: VecDeque::new(),
            running: HashMap::new(),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn running_len(&self) -> usize {
        self.running.len()
    }

    pub fn push(&mut self, task: PendingTask) {
        self.pending.push_back(task);
    }

    /// Next task to start, if there is both a free slot and queued work.
    pub fn pop_startable(&mut self) -> Option<PendingTask> {
        if self.running.len() >= self.limit {
            return None;
        }
        self.pending.pop_front()
    }

    pub fn insert_running(&mut self, ticket: Ticket, running: RunningTask) {
        debug_assert!(self.running.len() < self.limit);
        self.running.insert(ticket, running);
    }

    pub fn remove_running(&mut self, ticket: Ticket) -> Option<RunningTask> {
        self.running.remove(&ticket)
    }

    /// Pull every pending entry with this id out of the FIFO, keeping the
    /// order of the rest.
    pub fn remove_pending(&mut self, task_id: &TaskId) -> Vec<PendingTask> {
        let mut removed = Vec::new();
        let mut kept = VecDeque::with_capacity(self.pending.len());
        for entry in self.pending.drain(..) {
            if entry.task.id() == task_id {
                removed.push(entry);
            } else {
                kept.push_back(entry);
            }
        }
        self.pending = kept;
        removed
    }

    pub fn drain_pending(&mut self) -> Vec<PendingTask> {
        self.pending.drain(..).collect()
    }

    pub fn pending(&self) -> impl Iterator<Item = &PendingTask> {
        self.pending.iter()
    }

    pub fn running(&self) -> impl Iterator<Item = &RunningTask> {
        self.running.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Lane, Task};
    use chrono::Utc;

    fn pending(ticket: Ticket, id: &str) -> PendingTask {
        PendingTask {
            ticket,
            task: Task::from_fn(id, Lane::Main, id, |_ctx| async { Ok(serde_json::Value::Null) }),
            enqueued_at: Utc::now(),
        }
    }

    fn start_next(lane: &mut LaneState) -> Option<String> {
        let next = lane.pop_startable()?;
        let id = next.task.id().to_string();
        lane.insert_running(
            next.ticket,
            RunningTask::new(next.task.id().clone(), Lane::Main, id.clone(), Utc::now()),
        );
        Some(id)
    }

    #[tokio::test]
    async fn pops_in_fifo_order_up_to_limit() {
        let mut lane = LaneState::new(2);
        for (t, id) in [(1, "a"), (2, "b"), (3, "c")] {
            lane.push(pending(t, id));
        }

        assert_eq!(start_next(&mut lane).as_deref(), Some("a"));
        assert_eq!(start_next(&mut lane).as_deref(), Some("b"));
        assert_eq!(start_next(&mut lane), None);
        assert_eq!(lane.pending_len(), 1);

        lane.remove_running(1);
        assert_eq!(start_next(&mut lane).as_deref(), Some("c"));
    }

    #[test]
    fn remove_pending_takes_all_duplicates_and_keeps_order() {
        let mut lane = LaneState::new(1);
        for (t, id) in [(1, "a"), (2, "dup"), (3, "b"), (4, "dup"), (5, "c")] {
            lane.push(pending(t, id));
        }

        let removed = lane.remove_pending(&TaskId::new("dup"));
        assert_eq!(removed.iter().map(|p| p.ticket).collect::<Vec<_>>(), vec![2, 4]);

        let left: Vec<_> = lane.pending().map(|p| p.task.id().to_string()).collect();
        assert_eq!(left, vec!["a", "b", "c"]);
    }

    #[test]
    fn remove_unknown_is_noop() {
        let mut lane = LaneState::new(1);
        lane.push(pending(1, "a"));
        assert!(lane.remove_pending(&TaskId::new("zzz")).is_empty());
        assert_eq!(lane.pending_len(), 1);
    }
}
