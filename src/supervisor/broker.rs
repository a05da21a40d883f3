//! Supervisor: routes instructions to agents and owns the agent status
//! table. Lifecycle events go out on its broadcast channel.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{RwLock, broadcast};
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::events::{Subscription, SupervisorEvent};
use super::handle::{AgentHandle, AgentSlot};
use crate::agents::{
    AgentMode, AgentRegistration, AgentStatus, MasConfig, Message, MessagePayload,
    default_agents,
};
use crate::config::{SupervisorConfig, load_mas_config};
use crate::error::{self, SupervisorError};
use crate::tasks::{Instruction, Priority, QueueState, QueueStats, Task};

/// What delivering a [`Message`] did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Delivery {
    /// Execution permission changed; carries the updated status.
    StatusChanged { agent: AgentStatus },
    /// The active task was aborted.
    Aborted { task_id: Uuid },
    /// An instruction payload was admitted.
    Queued { task: Task },
    /// Reply to a ping.
    Status { agent: AgentStatus },
    /// Nothing to do: unknown payload, abort with no active task, or an
    /// activation that did not change anything.
    Ignored,
}

/// Registered agents, in registration order.
#[derive(Default)]
struct AgentTable {
    order: Vec<String>,
    slots: HashMap<String, Arc<AgentSlot>>,
}

/// Dispatch broker for all agents.
///
/// Built once at startup and shared as `Arc<Supervisor>`.
pub struct Supervisor {
    agents: RwLock<AgentTable>,
    events: broadcast::Sender<SupervisorEvent>,
}

impl Supervisor {
    /// A supervisor with no agents registered.
    pub fn new(config: &SupervisorConfig) -> Arc<Self> {
        let (events, _rx) = broadcast::channel(config.event_capacity);
        Arc::new(Self {
            agents: RwLock::new(AgentTable::default()),
            events,
        })
    }

    /// A supervisor with the default coder/refactor/doc agents registered.
    pub async fn with_default_agents(config: &SupervisorConfig) -> Arc<Self> {
        let supervisor = Self::new(config);
        for agent in default_agents() {
            if let Err(e) = supervisor.register_agent(agent).await {
                warn!(error = %e, "Skipping default agent");
            }
        }
        supervisor
    }

    /// The default agents plus whatever `config.agents_file` registers and
    /// overrides. A missing or malformed agents file is an error.
    pub async fn from_config(config: &SupervisorConfig) -> error::Result<Arc<Self>> {
        let supervisor = Self::with_default_agents(config).await;
        if let Some(path) = &config.agents_file {
            let mas_config = load_mas_config(path)?;
            supervisor.apply_config(mas_config).await;
            info!(path = %path.display(), "Applied agents file");
        }
        Ok(supervisor)
    }

    /// Subscribe to every event.
    pub fn subscribe(&self) -> Subscription {
        Subscription::new(self.events.subscribe())
    }

    /// The raw broadcast receiver, for consumers that handle lagging
    /// themselves.
    pub fn event_receiver(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.events.subscribe()
    }

    /// The raw event feed as a `Stream`. Lagging shows up as `Err` items.
    pub fn event_stream(&self) -> BroadcastStream<SupervisorEvent> {
        BroadcastStream::new(self.events.subscribe())
    }

    fn publish(&self, event: SupervisorEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    async fn slot(&self, agent_id: &str) -> Result<Arc<AgentSlot>, SupervisorError> {
        self.agents
            .read()
            .await
            .slots
            .get(agent_id)
            .cloned()
            .ok_or_else(|| SupervisorError::UnknownAgent {
                agent_id: agent_id.to_string(),
            })
    }

    // ── Registry ────────────────────────────────────────────────────────

    pub async fn register_agent(
        &self,
        registration: AgentRegistration,
    ) -> Result<AgentStatus, SupervisorError> {
        let status = registration.into_status();
        {
            let mut table = self.agents.write().await;
            if table.slots.contains_key(&status.id) {
                return Err(SupervisorError::DuplicateAgent {
                    agent_id: status.id,
                });
            }
            table.order.push(status.id.clone());
            table
                .slots
                .insert(status.id.clone(), Arc::new(AgentSlot::new(status.clone())));
        }

        info!(agent_id = %status.id, name = %status.name, active = status.is_active, "Agent registered");
        self.publish(SupervisorEvent::AgentRegistered {
            agent: status.clone(),
        });
        Ok(status)
    }

    /// The handle an agent runtime uses to dequeue and report tasks.
    pub async fn agent(&self, agent_id: &str) -> Result<AgentHandle, SupervisorError> {
        let slot = self.slot(agent_id).await?;
        Ok(AgentHandle::new(
            agent_id.to_string(),
            slot,
            self.events.clone(),
        ))
    }

    pub async fn agent_ids(&self) -> Vec<String> {
        self.agents.read().await.order.clone()
    }

    pub async fn agent_status(&self, agent_id: &str) -> Result<AgentStatus, SupervisorError> {
        let slot = self.slot(agent_id).await?;
        let status = slot.status.read().await.clone();
        Ok(status)
    }

    /// Status of every agent, in registration order.
    pub async fn all_agents_status(&self) -> Vec<AgentStatus> {
        let slots: Vec<Arc<AgentSlot>> = {
            let table = self.agents.read().await;
            table
                .order
                .iter()
                .filter_map(|id| table.slots.get(id).cloned())
                .collect()
        };

        let mut statuses = Vec::with_capacity(slots.len());
        for slot in slots {
            statuses.push(slot.status.read().await.clone());
        }
        statuses
    }

    /// Grant or revoke execution permission. The queue is not touched.
    /// Returns the new status and whether anything changed.
    pub async fn set_agent_active(
        &self,
        agent_id: &str,
        is_active: bool,
    ) -> Result<(AgentStatus, bool), SupervisorError> {
        let slot = self.slot(agent_id).await?;
        let (status, changed) = {
            let mut status = slot.status.write().await;
            let changed = status.is_active != is_active;
            status.is_active = is_active;
            status.touch();
            (status.clone(), changed)
        };

        if changed {
            info!(agent_id = %agent_id, active = is_active, "Agent activation changed");
            if is_active {
                slot.wakeup.notify_one();
            }
            self.publish(SupervisorEvent::AgentUpdated {
                agent: status.clone(),
            });
        }
        Ok((status, changed))
    }

    pub async fn set_agent_mode(
        &self,
        agent_id: &str,
        mode: AgentMode,
    ) -> Result<AgentStatus, SupervisorError> {
        let slot = self.slot(agent_id).await?;
        let status = {
            let mut status = slot.status.write().await;
            status.mode = mode;
            status.touch();
            status.clone()
        };

        info!(agent_id = %agent_id, mode = %mode, "Agent mode changed");
        self.publish(SupervisorEvent::AgentUpdated {
            agent: status.clone(),
        });
        Ok(status)
    }

    /// Register any extra agents, then apply mode/activation overrides.
    /// Overrides for unknown agents are skipped.
    pub async fn apply_config(&self, config: MasConfig) {
        for registration in config.register {
            if let Err(e) = self.register_agent(registration).await {
                warn!(error = %e, "Skipping agent registration from config");
            }
        }

        for entry in config.agents {
            if let Some(mode) = entry.mode {
                if let Err(e) = self.set_agent_mode(&entry.id, mode).await {
                    debug!(error = %e, "Skipping mode override");
                }
            }
            if let Some(enabled) = entry.is_enabled {
                if let Err(e) = self.set_agent_active(&entry.id, enabled).await {
                    debug!(error = %e, "Skipping activation override");
                }
            }
        }
    }

    // ── Admission ───────────────────────────────────────────────────────

    /// Admit an instruction for `agent_id`. Unknown agents are rejected and
    /// nothing is queued. Inactive agents still accept instructions.
    pub async fn queue_instruction(
        &self,
        agent_id: &str,
        text: impl Into<String>,
        priority: Option<Priority>,
    ) -> Result<Task, SupervisorError> {
        let instruction = Instruction::new(text).with_priority(priority.unwrap_or_default());
        self.admit(agent_id, instruction).await
    }

    /// Admit a fully built instruction (keeps its id if it has one).
    pub async fn admit(
        &self,
        agent_id: &str,
        instruction: Instruction,
    ) -> Result<Task, SupervisorError> {
        let slot = self.slot(agent_id).await?;
        let mut queue = slot.queue.lock().await;
        let task = queue.add_task_for(agent_id, instruction).clone();

        info!(
            agent_id = %agent_id,
            task_id = %task.id,
            priority = %task.priority(),
            "Instruction queued"
        );
        self.publish(SupervisorEvent::InstructionQueued {
            agent_id: agent_id.to_string(),
            task_id: task.id,
            instruction: task.instruction.clone(),
        });
        drop(queue);

        slot.wakeup.notify_one();
        Ok(task)
    }

    /// Queue a fresh copy of a finished task's instruction.
    pub async fn rerun_task(&self, agent_id: &str, task_id: Uuid) -> Result<Task, SupervisorError> {
        let slot = self.slot(agent_id).await?;
        let original = slot
            .queue
            .lock()
            .await
            .find_task(task_id)
            .cloned()
            .ok_or_else(|| SupervisorError::TaskNotFound {
                agent_id: agent_id.to_string(),
                task_id,
            })?;

        if !original.status.is_terminal() {
            return Err(SupervisorError::TaskNotTerminal {
                task_id,
                status: original.status,
            });
        }

        let instruction =
            Instruction::new(original.instruction.text).with_priority(original.instruction.priority);
        info!(agent_id = %agent_id, rerun_of = %task_id, "Rerunning task");
        self.admit(agent_id, instruction).await
    }

    // ── Cancellation ────────────────────────────────────────────────────

    /// Abort a pending or active task. Returns `false` if the task is
    /// unknown or already finished.
    ///
    /// Aborting an active task only updates bookkeeping; stopping the work
    /// in flight is up to the agent runtime.
    pub async fn abort_task(&self, agent_id: &str, task_id: Uuid) -> Result<bool, SupervisorError> {
        let slot = self.slot(agent_id).await?;
        let mut queue = slot.queue.lock().await;
        if !queue.abort_task(task_id) {
            debug!(agent_id = %agent_id, task_id = %task_id, "Nothing to abort");
            return Ok(false);
        }

        {
            let mut status = slot.status.write().await;
            if status.current_task_id == Some(task_id) {
                status.current_task = None;
                status.current_task_id = None;
            }
            status.touch();
        }

        info!(agent_id = %agent_id, task_id = %task_id, "Task aborted");
        self.publish(SupervisorEvent::TaskAborted {
            agent_id: agent_id.to_string(),
            task_id,
        });
        drop(queue);

        slot.wakeup.notify_one();
        Ok(true)
    }

    // ── Messaging ───────────────────────────────────────────────────────

    /// Deliver a control message to its recipient.
    pub async fn send_message(&self, message: Message) -> Result<Delivery, SupervisorError> {
        let slot = self.slot(&message.to).await?;
        debug!(
            message_id = %message.id,
            from = %message.from,
            to = %message.to,
            payload = message.payload.label(),
            "Delivering message"
        );
        self.publish(SupervisorEvent::MessageReceived {
            message: message.clone(),
        });

        let delivery = match message.payload {
            MessagePayload::Activate => self.deliver_activation(&message.to, true).await?,
            MessagePayload::Deactivate => self.deliver_activation(&message.to, false).await?,
            MessagePayload::Abort => {
                let active = slot.queue.lock().await.active_task().map(|t| t.id);
                match active {
                    Some(task_id) => {
                        if self.abort_task(&message.to, task_id).await? {
                            Delivery::Aborted { task_id }
                        } else {
                            Delivery::Ignored
                        }
                    }
                    None => Delivery::Ignored,
                }
            }
            MessagePayload::Instruction { text, priority } => {
                let task = self
                    .queue_instruction(&message.to, text, Some(priority))
                    .await?;
                Delivery::Queued { task }
            }
            MessagePayload::Ping => Delivery::Status {
                agent: slot.status.read().await.clone(),
            },
            MessagePayload::Unrecognized => {
                debug!(message_id = %message.id, "Unrecognized payload, ignoring");
                Delivery::Ignored
            }
        };
        Ok(delivery)
    }

    async fn deliver_activation(
        &self,
        agent_id: &str,
        is_active: bool,
    ) -> Result<Delivery, SupervisorError> {
        let (agent, changed) = self.set_agent_active(agent_id, is_active).await?;
        Ok(if changed {
            Delivery::StatusChanged { agent }
        } else {
            Delivery::Ignored
        })
    }

    // ── Queue inspection ────────────────────────────────────────────────

    pub async fn queue_state(&self, agent_id: &str) -> Result<QueueState, SupervisorError> {
        let slot = self.slot(agent_id).await?;
        let state = slot.queue.lock().await.queue_state();
        Ok(state)
    }

    pub async fn queue_stats(&self, agent_id: &str) -> Result<QueueStats, SupervisorError> {
        let slot = self.slot(agent_id).await?;
        let stats = slot.queue.lock().await.stats();
        Ok(stats)
    }

    pub async fn all_tasks(&self, agent_id: &str) -> Result<Vec<Task>, SupervisorError> {
        let slot = self.slot(agent_id).await?;
        let tasks = slot.queue.lock().await.all_tasks();
        Ok(tasks)
    }

    /// Completed and failed/aborted history, most recent first.
    pub async fn history(
        &self,
        agent_id: &str,
        limit: Option<usize>,
    ) -> Result<(Vec<Task>, Vec<Task>), SupervisorError> {
        let slot = self.slot(agent_id).await?;
        let queue = slot.queue.lock().await;
        Ok((queue.completed_tasks(limit), queue.failed_tasks(limit)))
    }

    pub async fn task(&self, agent_id: &str, task_id: Uuid) -> Result<Task, SupervisorError> {
        let slot = self.slot(agent_id).await?;
        let task = slot.queue.lock().await.find_task(task_id).cloned();
        task.ok_or_else(|| SupervisorError::TaskNotFound {
            agent_id: agent_id.to_string(),
            task_id,
        })
    }

    /// Drop an agent's completed/failed history. Pending work and lifetime
    /// counters are kept. Returns how many finished tasks were dropped.
    pub async fn clear_history(&self, agent_id: &str) -> Result<usize, SupervisorError> {
        let slot = self.slot(agent_id).await?;
        let mut queue = slot.queue.lock().await;
        let dropped = queue.completed_tasks(None).len() + queue.failed_tasks(None).len();
        queue.clear_history();
        info!(agent_id = %agent_id, dropped, "History cleared");
        Ok(dropped)
    }

    /// Wipe an agent's queue, active task and counters.
    pub async fn reset_queue(&self, agent_id: &str) -> Result<AgentStatus, SupervisorError> {
        let slot = self.slot(agent_id).await?;
        let mut queue = slot.queue.lock().await;
        queue.reset();

        let agent = {
            let mut status = slot.status.write().await;
            status.current_task = None;
            status.current_task_id = None;
            status.touch();
            status.clone()
        };

        info!(agent_id = %agent_id, "Queue reset");
        self.publish(SupervisorEvent::AgentUpdated {
            agent: agent.clone(),
        });
        drop(queue);

        slot.wakeup.notify_one();
        Ok(agent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;
    use crate::supervisor::events::EventKind;
    use crate::tasks::{TaskResult, TaskStatus};

    async fn supervisor() -> Arc<Supervisor> {
        Supervisor::with_default_agents(&SupervisorConfig::default()).await
    }

    #[tokio::test]
    async fn default_agents_registered_in_order() {
        let sup = supervisor().await;
        let ids: Vec<String> = sup
            .all_agents_status()
            .await
            .into_iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(ids, ["coder-agent", "refactor-agent", "doc-agent"]);
    }

    #[tokio::test]
    async fn duplicate_registration_rejected() {
        let sup = supervisor().await;
        let err = sup
            .register_agent(AgentRegistration::new("coder-agent", "Again"))
            .await
            .unwrap_err();
        assert!(matches!(err, SupervisorError::DuplicateAgent { .. }));
    }

    #[tokio::test]
    async fn queue_instruction_emits_event() {
        let sup = supervisor().await;
        let mut events = sup.subscribe();

        let task = sup
            .queue_instruction("coder-agent", "write a parser", Some(Priority::High))
            .await
            .unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.assigned_to.as_deref(), Some("coder-agent"));

        match events.recv().await.unwrap() {
            SupervisorEvent::InstructionQueued {
                agent_id,
                task_id,
                instruction,
            } => {
                assert_eq!(agent_id, "coder-agent");
                assert_eq!(task_id, task.id);
                assert_eq!(instruction.text, "write a parser");
                assert_eq!(instruction.priority, Priority::High);
            }
            other => panic!("Expected InstructionQueued, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_agent_rejected_without_queueing() {
        let sup = supervisor().await;
        let err = sup
            .queue_instruction("ghost-agent", "boo", None)
            .await
            .unwrap_err();
        assert!(matches!(err, SupervisorError::UnknownAgent { ref agent_id } if agent_id == "ghost-agent"));

        for agent in sup.agent_ids().await {
            assert_eq!(sup.queue_state(&agent).await.unwrap().total, 0);
        }
    }

    #[tokio::test]
    async fn inactive_agent_still_accepts_instructions() {
        let sup = supervisor().await;
        assert!(!sup.agent_status("doc-agent").await.unwrap().is_active);

        sup.queue_instruction("doc-agent", "document the API", None)
            .await
            .unwrap();
        assert_eq!(sup.queue_state("doc-agent").await.unwrap().pending, 1);
    }

    #[tokio::test]
    async fn deactivate_message_leaves_queue_untouched() {
        let sup = supervisor().await;
        sup.queue_instruction("coder-agent", "a", None).await.unwrap();
        sup.queue_instruction("coder-agent", "b", None).await.unwrap();
        let before = sup.queue_state("coder-agent").await.unwrap();

        let delivery = sup
            .send_message(Message::deactivate("ui", "coder-agent"))
            .await
            .unwrap();
        match delivery {
            Delivery::StatusChanged { agent } => assert!(!agent.is_active),
            other => panic!("Expected StatusChanged, got {other:?}"),
        }
        assert_eq!(sup.queue_state("coder-agent").await.unwrap(), before);

        // Reactivating twice only changes things once.
        assert!(matches!(
            sup.send_message(Message::activate("ui", "coder-agent")).await.unwrap(),
            Delivery::StatusChanged { .. }
        ));
        assert_eq!(
            sup.send_message(Message::activate("ui", "coder-agent")).await.unwrap(),
            Delivery::Ignored
        );
    }

    #[tokio::test]
    async fn message_to_unknown_agent_is_error() {
        let sup = supervisor().await;
        let err = sup
            .send_message(Message::activate("ui", "nobody"))
            .await
            .unwrap_err();
        assert!(matches!(err, SupervisorError::UnknownAgent { .. }));
    }

    #[tokio::test]
    async fn unrecognized_payload_is_noop() {
        let sup = supervisor().await;
        let before = sup.agent_status("coder-agent").await.unwrap();
        let delivery = sup
            .send_message(Message::notification(
                "ui",
                "coder-agent",
                MessagePayload::Unrecognized,
            ))
            .await
            .unwrap();
        assert_eq!(delivery, Delivery::Ignored);
        assert_eq!(sup.agent_status("coder-agent").await.unwrap(), before);
    }

    #[tokio::test]
    async fn instruction_and_ping_messages() {
        let sup = supervisor().await;
        let delivery = sup
            .send_message(Message::instruction("supervisor", "coder-agent", "lint", Priority::Low))
            .await
            .unwrap();
        let Delivery::Queued { task } = delivery else {
            panic!("Expected Queued");
        };
        assert_eq!(task.priority(), Priority::Low);

        let delivery = sup
            .send_message(Message::notification("ui", "coder-agent", MessagePayload::Ping))
            .await
            .unwrap();
        assert!(matches!(delivery, Delivery::Status { agent } if agent.id == "coder-agent"));
    }

    #[tokio::test]
    async fn lifecycle_through_handle_updates_status_and_events() {
        let sup = supervisor().await;
        let mut events = sup
            .subscribe()
            .only([EventKind::TaskStarted, EventKind::InstructionCompleted]);
        let handle = sup.agent("coder-agent").await.unwrap();

        let queued = sup.queue_instruction("coder-agent", "X", None).await.unwrap();
        let started = handle.start_next_task().await.unwrap();
        assert_eq!(started.id, queued.id);
        assert!(handle.start_next_task().await.is_none());

        let status = sup.agent_status("coder-agent").await.unwrap();
        assert_eq!(status.current_task.as_deref(), Some("X"));
        assert_eq!(status.current_task_id, Some(queued.id));

        let done = handle
            .complete_active_task(TaskResult::new("ok"))
            .await
            .unwrap();
        assert_eq!(done.status, TaskStatus::Completed);

        let status = sup.agent_status("coder-agent").await.unwrap();
        assert!(status.current_task.is_none());
        assert!(status.last_activity.is_some());

        assert!(matches!(events.recv().await.unwrap(), SupervisorEvent::TaskStarted { .. }));
        match events.recv().await.unwrap() {
            SupervisorEvent::InstructionCompleted { agent_id, result, .. } => {
                assert_eq!(agent_id, "coder-agent");
                assert_eq!(result.explanation, "ok");
            }
            other => panic!("Expected InstructionCompleted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn failure_emits_event_and_records_warning() {
        let sup = supervisor().await;
        let mut events = sup.subscribe().only([EventKind::InstructionFailed]);
        let handle = sup.agent("coder-agent").await.unwrap();

        sup.queue_instruction("coder-agent", "X", None).await.unwrap();
        handle.start_next_task().await.unwrap();
        handle.fail_active_task("timeout").await.unwrap();

        match events.recv().await.unwrap() {
            SupervisorEvent::InstructionFailed { error, .. } => assert_eq!(error, "timeout"),
            other => panic!("Expected InstructionFailed, got {other:?}"),
        }
        let status = sup.agent_status("coder-agent").await.unwrap();
        assert_eq!(status.warnings, vec!["Execution failed: timeout".to_string()]);

        // A failure does not halt the queue.
        sup.queue_instruction("coder-agent", "Y", None).await.unwrap();
        assert!(handle.start_next_task().await.is_some());
    }

    #[tokio::test]
    async fn completion_without_active_task_emits_nothing() {
        let sup = supervisor().await;
        let mut events = sup.subscribe();
        let handle = sup.agent("coder-agent").await.unwrap();

        assert!(handle.complete_active_task(TaskResult::default()).await.is_none());
        assert!(handle.fail_active_task("x").await.is_none());

        let next = tokio::time::timeout(std::time::Duration::from_millis(50), events.recv()).await;
        assert!(next.is_err(), "no event expected");
    }

    #[tokio::test]
    async fn abort_active_via_message() {
        let sup = supervisor().await;
        let handle = sup.agent("coder-agent").await.unwrap();
        sup.queue_instruction("coder-agent", "long job", None).await.unwrap();
        let task = handle.start_next_task().await.unwrap();

        let delivery = sup
            .send_message(Message::notification("ui", "coder-agent", MessagePayload::Abort))
            .await
            .unwrap();
        assert_eq!(delivery, Delivery::Aborted { task_id: task.id });
        assert!(sup.agent_status("coder-agent").await.unwrap().current_task.is_none());

        // Late report from the runtime is dropped.
        assert!(handle.report(task.id, Ok(TaskResult::default())).await.is_none());
        let (completed, failed) = sup.history("coder-agent", None).await.unwrap();
        assert!(completed.is_empty());
        assert_eq!(failed[0].status, TaskStatus::Aborted);

        // Nothing active any more: abort is ignored.
        assert_eq!(
            sup.send_message(Message::notification("ui", "coder-agent", MessagePayload::Abort))
                .await
                .unwrap(),
            Delivery::Ignored
        );
    }

    #[tokio::test]
    async fn abort_finished_task_is_false() {
        let sup = supervisor().await;
        let handle = sup.agent("coder-agent").await.unwrap();
        let task = sup.queue_instruction("coder-agent", "x", None).await.unwrap();
        handle.start_next_task().await.unwrap();
        handle.complete_active_task(TaskResult::default()).await.unwrap();

        assert!(!sup.abort_task("coder-agent", task.id).await.unwrap());
    }

    #[tokio::test]
    async fn rerun_finished_task() {
        let sup = supervisor().await;
        let handle = sup.agent("coder-agent").await.unwrap();
        let task = sup
            .queue_instruction("coder-agent", "flaky", Some(Priority::High))
            .await
            .unwrap();

        let err = sup.rerun_task("coder-agent", task.id).await.unwrap_err();
        assert!(matches!(err, SupervisorError::TaskNotTerminal { status: TaskStatus::Pending, .. }));

        handle.start_next_task().await.unwrap();
        handle.fail_active_task("network").await.unwrap();

        let rerun = sup.rerun_task("coder-agent", task.id).await.unwrap();
        assert_ne!(rerun.id, task.id);
        assert_eq!(rerun.instruction.text, "flaky");
        assert_eq!(rerun.priority(), Priority::High);
        assert_eq!(rerun.status, TaskStatus::Pending);

        let err = sup.rerun_task("coder-agent", Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, SupervisorError::TaskNotFound { .. }));
    }

    #[tokio::test]
    async fn agents_do_not_share_queues() {
        let sup = supervisor().await;
        sup.queue_instruction("coder-agent", "code", None).await.unwrap();
        sup.queue_instruction("doc-agent", "docs", None).await.unwrap();

        let coder = sup.agent("coder-agent").await.unwrap();
        let doc = sup.agent("doc-agent").await.unwrap();

        // Both agents can have an active task at the same time.
        assert_eq!(coder.start_next_task().await.unwrap().instruction.text, "code");
        assert_eq!(doc.start_next_task().await.unwrap().instruction.text, "docs");
    }

    #[tokio::test]
    async fn apply_config_overrides() {
        let sup = supervisor().await;
        let config: MasConfig = serde_json::from_str(
            r#"{
                "register": [{"id": "test-agent", "name": "Test Agent", "is_active": false}],
                "agents": [
                    {"id": "doc-agent", "is_enabled": true},
                    {"id": "coder-agent", "mode": "supervised"},
                    {"id": "missing-agent", "is_enabled": true}
                ]
            }"#,
        )
        .unwrap();

        sup.apply_config(config).await;

        assert!(sup.agent_status("doc-agent").await.unwrap().is_active);
        assert_eq!(
            sup.agent_status("coder-agent").await.unwrap().mode,
            AgentMode::Supervised
        );
        assert!(!sup.agent_status("test-agent").await.unwrap().is_active);
        assert_eq!(sup.agent_ids().await.len(), 4);
    }

    #[tokio::test]
    async fn reset_queue_clears_active_and_counts() {
        let sup = supervisor().await;
        let handle = sup.agent("coder-agent").await.unwrap();
        sup.queue_instruction("coder-agent", "a", None).await.unwrap();
        sup.queue_instruction("coder-agent", "b", None).await.unwrap();
        handle.start_next_task().await.unwrap();

        let mut events = sup.subscribe().only([EventKind::AgentUpdated]);
        // Consume the permit left by admission.
        tokio::time::timeout(std::time::Duration::from_millis(100), handle.notified())
            .await
            .unwrap();

        let cleared = sup.reset_queue("coder-agent").await.unwrap();
        assert!(cleared.current_task_id.is_none());

        assert_eq!(sup.queue_state("coder-agent").await.unwrap(), QueueState::default());
        assert!(handle.active_task().await.is_none());
        assert!(sup.agent_status("coder-agent").await.unwrap().current_task.is_none());
        assert_eq!(sup.queue_stats("coder-agent").await.unwrap(), QueueStats::default());

        match events.recv().await.unwrap() {
            SupervisorEvent::AgentUpdated { agent } => {
                assert_eq!(agent.id, "coder-agent");
                assert!(agent.current_task.is_none());
                assert!(agent.current_task_id.is_none());
            }
            other => panic!("Expected AgentUpdated, got {other:?}"),
        }

        // The reset left a wake-up behind for the agent's runtime.
        tokio::time::timeout(std::time::Duration::from_millis(100), handle.notified())
            .await
            .expect("reset should wake the runtime");
    }

    #[tokio::test]
    async fn clear_history_keeps_pending_work() {
        let sup = supervisor().await;
        let handle = sup.agent("coder-agent").await.unwrap();
        sup.queue_instruction("coder-agent", "done", None).await.unwrap();
        sup.queue_instruction("coder-agent", "broken", None).await.unwrap();
        sup.queue_instruction("coder-agent", "later", None).await.unwrap();
        handle.start_next_task().await.unwrap();
        handle.complete_active_task(TaskResult::default()).await.unwrap();
        handle.start_next_task().await.unwrap();
        handle.fail_active_task("nope").await.unwrap();

        assert_eq!(sup.clear_history("coder-agent").await.unwrap(), 2);

        let (completed, failed) = sup.history("coder-agent", None).await.unwrap();
        assert!(completed.is_empty() && failed.is_empty());
        assert_eq!(sup.queue_state("coder-agent").await.unwrap().pending, 1);
        let stats = sup.queue_stats("coder-agent").await.unwrap();
        assert_eq!(stats.completed_count, 1);
        assert_eq!(stats.failed_count, 1);

        assert!(matches!(
            sup.clear_history("ghost").await,
            Err(SupervisorError::UnknownAgent { .. })
        ));
    }

    #[tokio::test]
    async fn from_config_applies_agents_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"register": [{{"id": "test-agent", "name": "Test Agent"}}],
                "agents": [{{"id": "doc-agent", "is_enabled": true}}]}}"#
        )
        .unwrap();

        let config = SupervisorConfig {
            agents_file: Some(file.path().to_path_buf()),
            ..SupervisorConfig::default()
        };
        let sup = Supervisor::from_config(&config).await.unwrap();
        assert_eq!(sup.agent_ids().await.len(), 4);
        assert!(sup.agent_status("doc-agent").await.unwrap().is_active);

        let config = SupervisorConfig {
            agents_file: Some("/nonexistent/agents.json".into()),
            ..SupervisorConfig::default()
        };
        let err = Supervisor::from_config(&config).await.err().unwrap();
        assert!(matches!(err, crate::error::Error::Config(ConfigError::Io(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_dequeue_activates_one_task() {
        let sup = supervisor().await;
        for i in 0..20 {
            sup.queue_instruction("coder-agent", format!("task {i}"), None)
                .await
                .unwrap();
        }
        let handle = sup.agent("coder-agent").await.unwrap();

        let callers: Vec<_> = (0..32)
            .map(|_| {
                let handle = handle.clone();
                tokio::spawn(async move { handle.start_next_task().await })
            })
            .collect();

        let mut started = Vec::new();
        for caller in callers {
            if let Some(task) = caller.await.unwrap() {
                started.push(task);
            }
        }

        assert_eq!(started.len(), 1, "exactly one caller may start a task");
        assert_eq!(started[0].instruction.text, "task 0");
        let state = sup.queue_state("coder-agent").await.unwrap();
        assert_eq!(state.active, 1);
        assert_eq!(state.pending, 19);
        assert_eq!(
            sup.agent_status("coder-agent").await.unwrap().current_task_id,
            Some(started[0].id)
        );
    }
}
