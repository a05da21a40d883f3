//! Error types for the agent dispatch system.

use uuid::Uuid;

use crate::tasks::TaskStatus;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Supervisor error: {0}")]
    Supervisor(#[from] SupervisorError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors raised by the supervisor when a caller addresses something that
/// does not exist or is in the wrong state.
///
/// Expected races inside a single agent's queue (completing twice, aborting
/// a finished task) are not errors; those return `None`/`false`.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("Agent {agent_id} not found")]
    UnknownAgent { agent_id: String },

    #[error("Agent {agent_id} is already registered")]
    DuplicateAgent { agent_id: String },

    #[error("Task {task_id} not found for agent {agent_id}")]
    TaskNotFound { agent_id: String, task_id: Uuid },

    #[error("Task {task_id} is still {status}, only finished tasks can be rerun")]
    TaskNotTerminal { task_id: Uuid, status: TaskStatus },
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
