//! Per-agent slot and the handle the agent runtime drives it through.

use std::sync::Arc;

use tokio::sync::{Mutex, Notify, RwLock, broadcast};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::events::SupervisorEvent;
use crate::agents::AgentStatus;
use crate::tasks::{QueueState, Task, TaskQueueManager, TaskResult};

/// State private to one agent. Nothing in here is shared with other agents,
/// so agents never wait on each other.
pub(crate) struct AgentSlot {
    pub(crate) status: RwLock<AgentStatus>,
    /// Check-and-set of the active task happens under this lock, and
    /// lifecycle events are published while it is held. Lock order is
    /// queue, then status.
    pub(crate) queue: Mutex<TaskQueueManager>,
    /// Fired on admission, activation and abort so an idle runtime re-checks.
    pub(crate) wakeup: Notify,
}

impl AgentSlot {
    pub(crate) fn new(status: AgentStatus) -> Self {
        Self {
            status: RwLock::new(status),
            queue: Mutex::new(TaskQueueManager::new()),
            wakeup: Notify::new(),
        }
    }
}

/// The runtime's view of one agent.
///
/// Dequeue and completion go through here so that the supervisor can keep
/// the agent status table current and publish lifecycle events. Activation is
/// not enforced: the runtime checks [`is_active`](Self::is_active) before
/// calling [`start_next_task`](Self::start_next_task).
#[derive(Clone)]
pub struct AgentHandle {
    agent_id: String,
    slot: Arc<AgentSlot>,
    events: broadcast::Sender<SupervisorEvent>,
}

impl AgentHandle {
    pub(crate) fn new(
        agent_id: String,
        slot: Arc<AgentSlot>,
        events: broadcast::Sender<SupervisorEvent>,
    ) -> Self {
        Self {
            agent_id,
            slot,
            events,
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub async fn is_active(&self) -> bool {
        self.slot.status.read().await.is_active
    }

    pub async fn status(&self) -> AgentStatus {
        self.slot.status.read().await.clone()
    }

    /// Dequeue the next task by priority and mark it active. `None` if a
    /// task is already active or nothing is pending.
    pub async fn start_next_task(&self) -> Option<Task> {
        // Held until the event is out so events follow queue order.
        let mut queue = self.slot.queue.lock().await;
        let task = queue.start_next_task()?.clone();

        {
            let mut status = self.slot.status.write().await;
            status.current_task = Some(task.instruction.text.clone());
            status.current_task_id = Some(task.id);
            status.touch();
        }

        info!(agent_id = %self.agent_id, task_id = %task.id, "Task started");
        let _ = self.events.send(SupervisorEvent::TaskStarted {
            agent_id: self.agent_id.clone(),
            task: task.clone(),
        });

        Some(task)
    }

    /// Complete whatever task is active. `None` (and no event) if nothing is.
    pub async fn complete_active_task(&self, result: TaskResult) -> Option<Task> {
        let mut queue = self.slot.queue.lock().await;
        let task = queue.complete_active_task(result);
        self.finish(task).await
    }

    /// Fail whatever task is active. `None` (and no event) if nothing is.
    pub async fn fail_active_task(&self, error: impl Into<String>) -> Option<Task> {
        let mut queue = self.slot.queue.lock().await;
        let task = queue.fail_active_task(error);
        self.finish(task).await
    }

    /// Report the outcome of `task_id`.
    ///
    /// The report only lands if `task_id` is still the active task; a task
    /// aborted while it was executing has its late outcome dropped.
    pub async fn report(
        &self,
        task_id: Uuid,
        outcome: Result<TaskResult, String>,
    ) -> Option<Task> {
        let mut queue = self.slot.queue.lock().await;
        if !queue.is_active(task_id) {
            debug!(
                agent_id = %self.agent_id,
                task_id = %task_id,
                "Ignoring report for task that is no longer active"
            );
            return None;
        }
        let task = match outcome {
            Ok(result) => queue.complete_active_task(result),
            Err(error) => queue.fail_active_task(error),
        };
        self.finish(task).await
    }

    async fn finish(&self, task: Option<Task>) -> Option<Task> {
        let task = task?;

        {
            let mut status = self.slot.status.write().await;
            if status.current_task_id == Some(task.id) {
                status.current_task = None;
                status.current_task_id = None;
            }
            if let Some(error) = &task.error {
                status.push_warning(format!("Execution failed: {error}"));
            }
            status.touch();
        }

        let event = match (&task.result, &task.error) {
            (_, Some(error)) => {
                warn!(agent_id = %self.agent_id, task_id = %task.id, error = %error, "Task failed");
                SupervisorEvent::InstructionFailed {
                    agent_id: self.agent_id.clone(),
                    task_id: task.id,
                    instruction: task.instruction.clone(),
                    error: error.clone(),
                }
            }
            (result, None) => {
                info!(agent_id = %self.agent_id, task_id = %task.id, "Task completed");
                SupervisorEvent::InstructionCompleted {
                    agent_id: self.agent_id.clone(),
                    task_id: task.id,
                    instruction: task.instruction.clone(),
                    result: result.clone().unwrap_or_default(),
                }
            }
        };
        let _ = self.events.send(event);

        Some(task)
    }

    pub async fn active_task(&self) -> Option<Task> {
        self.slot.queue.lock().await.active_task().cloned()
    }

    pub async fn queue_state(&self) -> QueueState {
        self.slot.queue.lock().await.queue_state()
    }

    /// Wait until something may have changed for this agent.
    pub async fn notified(&self) {
        self.slot.wakeup.notified().await;
    }
}
