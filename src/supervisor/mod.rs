//! Supervisor: agent registry, instruction routing and lifecycle events.

pub mod broker;
pub mod events;
pub mod handle;

pub use broker::{Delivery, Supervisor};
pub use events::{EventKind, Subscription, SupervisorEvent};
pub use handle::AgentHandle;
