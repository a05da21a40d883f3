//! Lifecycle events published by the supervisor.
//!
//! One closed enum instead of string-named events, fanned out over a
//! `tokio::sync::broadcast` channel. Consumers that only care about some
//! events wrap their receiver in a [`Subscription`] with an [`EventKind`]
//! filter.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::warn;
use uuid::Uuid;

use crate::agents::{AgentStatus, Message};
use crate::tasks::{Instruction, Task, TaskResult};

/// Everything observers (UI, loggers, other agents) can be told about.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SupervisorEvent {
    /// An instruction was admitted into an agent's queue.
    InstructionQueued {
        agent_id: String,
        task_id: Uuid,
        instruction: Instruction,
    },
    /// The agent runtime dequeued a task and began executing it.
    TaskStarted { agent_id: String, task: Task },
    /// The runtime reported success.
    InstructionCompleted {
        agent_id: String,
        task_id: Uuid,
        instruction: Instruction,
        result: TaskResult,
    },
    /// The runtime reported failure.
    InstructionFailed {
        agent_id: String,
        task_id: Uuid,
        instruction: Instruction,
        error: String,
    },
    /// A pending or active task was cancelled.
    TaskAborted { agent_id: String, task_id: Uuid },
    AgentRegistered { agent: AgentStatus },
    /// Activation or mode changed.
    AgentUpdated { agent: AgentStatus },
    /// A control message was delivered.
    MessageReceived { message: Message },
}

/// Discriminant of [`SupervisorEvent`], used for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    InstructionQueued,
    TaskStarted,
    InstructionCompleted,
    InstructionFailed,
    TaskAborted,
    AgentRegistered,
    AgentUpdated,
    MessageReceived,
}

impl SupervisorEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::InstructionQueued { .. } => EventKind::InstructionQueued,
            Self::TaskStarted { .. } => EventKind::TaskStarted,
            Self::InstructionCompleted { .. } => EventKind::InstructionCompleted,
            Self::InstructionFailed { .. } => EventKind::InstructionFailed,
            Self::TaskAborted { .. } => EventKind::TaskAborted,
            Self::AgentRegistered { .. } => EventKind::AgentRegistered,
            Self::AgentUpdated { .. } => EventKind::AgentUpdated,
            Self::MessageReceived { .. } => EventKind::MessageReceived,
        }
    }

    /// The agent this event concerns.
    pub fn agent_id(&self) -> &str {
        match self {
            Self::InstructionQueued { agent_id, .. }
            | Self::TaskStarted { agent_id, .. }
            | Self::InstructionCompleted { agent_id, .. }
            | Self::InstructionFailed { agent_id, .. }
            | Self::TaskAborted { agent_id, .. } => agent_id,
            Self::AgentRegistered { agent } | Self::AgentUpdated { agent } => &agent.id,
            Self::MessageReceived { message } => &message.to,
        }
    }

    /// Whether this event closes out a task.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::InstructionCompleted { .. }
                | Self::InstructionFailed { .. }
                | Self::TaskAborted { .. }
        )
    }
}

/// A filtered view over the supervisor's event stream.
pub struct Subscription {
    rx: broadcast::Receiver<SupervisorEvent>,
    kinds: Option<Vec<EventKind>>,
    agent_id: Option<String>,
}

impl Subscription {
    pub(crate) fn new(rx: broadcast::Receiver<SupervisorEvent>) -> Self {
        Self {
            rx,
            kinds: None,
            agent_id: None,
        }
    }

    /// Only deliver events of the given kinds.
    pub fn only(mut self, kinds: impl IntoIterator<Item = EventKind>) -> Self {
        self.kinds = Some(kinds.into_iter().collect());
        self
    }

    /// Only deliver events about one agent.
    pub fn for_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    fn matches(&self, event: &SupervisorEvent) -> bool {
        let kind_ok = self
            .kinds
            .as_ref()
            .is_none_or(|kinds| kinds.contains(&event.kind()));
        let agent_ok = self
            .agent_id
            .as_deref()
            .is_none_or(|id| id == event.agent_id());
        kind_ok && agent_ok
    }

    /// Wait for the next matching event. Returns `None` once the supervisor
    /// is gone. Slow subscribers skip what they missed.
    pub async fn recv(&mut self) -> Option<SupervisorEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(missed = n, "Event subscriber lagged behind broadcast");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
