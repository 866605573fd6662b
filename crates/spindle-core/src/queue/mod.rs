//! Queue module: lanes, scheduling, events, and the await-wrapper.

mod bus;
mod context;
mod lanes;
mod manager;
mod record;
mod status;

pub use bus::EventSubscription;
pub use context::TaskContext;
pub use manager::TaskQueue;
pub use status::{ActiveTask, LaneStatus, QueueStatus, TaskView};

pub(crate) use record::RunningSample;
