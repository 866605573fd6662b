//! Domain model (ids, lanes, task status, events, tasks).

pub mod events;
pub mod ids;
pub mod lane;
pub mod state;
pub mod task;

pub use self::events::QueueEvent;
pub use self::ids::TaskId;
pub use self::lane::{Lane, UnknownLane};
pub use self::state::TaskStatus;
pub use self::task::{ProgressFn, Task, TaskAction};
