//! Task scheduling primitives.
//!
//! - `model`: Priority, Task state machine (Pending → Active → Completed/Failed/Aborted)
//! - `queue`: TaskQueueManager, one per agent, enforcing a single active task

pub mod model;
pub mod queue;

pub use model::{Instruction, Priority, Task, TaskResult, TaskStatus};
pub use queue::{PriorityDistribution, QueueState, QueueStats, TaskQueueManager};
