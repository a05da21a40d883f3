//! Agent identity and status table entries, plus the control message envelope.

pub mod message;
pub mod status;

pub use message::{Message, MessagePayload, MessageType};
pub use status::{
    AgentConfigEntry, AgentMode, AgentRegistration, AgentStatus, MasConfig, default_agents,
};
