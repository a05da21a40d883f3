//! The seam between the scheduler and whatever actually performs the work.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::agents::AgentStatus;
use crate::tasks::{Task, TaskResult};

/// Executes one task on behalf of an agent.
///
/// Returning `Err` marks the task failed with that message; the queue keeps
/// going either way.
#[async_trait]
pub trait AgentExecutor: Send + Sync {
    async fn execute(&self, agent: &AgentStatus, task: &Task) -> Result<TaskResult, String>;
}

/// Stand-in executor that waits a fixed time and reports success.
#[derive(Debug, Clone)]
pub struct SimulatedExecutor {
    latency: Duration,
}

impl SimulatedExecutor {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

impl Default for SimulatedExecutor {
    fn default() -> Self {
        Self::new(Duration::from_millis(2000))
    }
}

#[async_trait]
impl AgentExecutor for SimulatedExecutor {
    async fn execute(&self, agent: &AgentStatus, task: &Task) -> Result<TaskResult, String> {
        tokio::time::sleep(self.latency).await;
        Ok(TaskResult::new(format!("Task completed by {}", agent.name))
            .with_suggestions(vec![
                "Review the generated changes".to_string(),
                "Add tests for the affected code".to_string(),
            ])
            .with_output(json!({
                "agent_id": agent.id,
                "instruction": task.instruction.text,
            })))
    }
}
