//! Listener registry for queue events.
//!
//! Every listener gets its own unbounded channel, so a slow listener never
//! loses events and never blocks the queue. Dropping the
//! [`EventSubscription`] unsubscribes; the sender is pruned on the next emit.

use serde::de::DeserializeOwned;
use tokio::sync::mpsc;

use crate::domain::{QueueEvent, TaskId, TaskStatus};
use crate::error::QueueError;

#[derive(Debug, Default)]
pub(crate) struct EventBus {
    listeners: Vec<mpsc::UnboundedSender<QueueEvent>>,
}

impl EventBus {
    pub fn subscribe(&mut self) -> EventSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.push(tx);
        EventSubscription { rx }
    }

    pub fn emit(&mut self, event: QueueEvent) {
        self.listeners.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

/// Receiving end of a queue listener.
#[derive(Debug)]
pub struct EventSubscription {
    rx: mpsc::UnboundedReceiver<QueueEvent>,
}

impl EventSubscription {
    /// Next event, or `None` once the queue has been dropped.
    pub async fn recv(&mut self) -> Option<QueueEvent> {
        self.rx.recv().await
    }

    /// Next event if one is already buffered.
    pub fn try_recv(&mut self) -> Option<QueueEvent> {
        self.rx.try_recv().ok()
    }

    /// Wait for the terminal event of `task_id` and turn it into a result.
    ///
    /// Events of other tasks are skipped.
    pub async fn wait_for(&mut self, task_id: &TaskId) -> Result<serde_json::Value, QueueError> {
        while let Some(event) = self.rx.recv().await {
            match event {
                QueueEvent::TaskCompleted {
                    task_id: id,
                    result,
                } if &id == task_id => return Ok(result),
                QueueEvent::TaskFailed {
                    task_id: id,
                    error,
                    status,
                } if &id == task_id => {
                    return Err(if status == TaskStatus::Cancelled {
                        QueueError::Cancelled {
                            task_id: id,
                            message: error,
                        }
                    } else {
                        QueueError::Failed {
                            task_id: id,
                            message: error,
                        }
                    });
                }
                _ => continue,
            }
        }
        Err(QueueError::Closed(task_id.clone()))
    }

    /// [`wait_for`](Self::wait_for), decoding the result as `T`.
    pub async fn wait_for_as<T: DeserializeOwned>(
        &mut self,
        task_id: &TaskId,
    ) -> Result<T, QueueError> {
        let value = self.wait_for(task_id).await?;
        serde_json::from_value(value).map_err(|source| QueueError::Decode {
            task_id: task_id.clone(),
            source,
        })
    }
}
