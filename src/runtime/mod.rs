//! Agent runtime: the loop that pulls tasks from one agent's queue and
//! reports their outcome back to the supervisor.
//!
//! Each agent gets its own runtime task. The runtime only dequeues while the
//! agent is active, runs one task at a time, and reports each task exactly
//! once. Between tasks it sleeps until the agent's wake-up signal fires
//! (admission, activation, abort) or the idle interval elapses.

pub mod executor;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub use executor::{AgentExecutor, SimulatedExecutor};

use crate::supervisor::AgentHandle;

pub struct AgentRuntime {
    handle: AgentHandle,
    executor: Arc<dyn AgentExecutor>,
    idle_interval: Duration,
}

impl AgentRuntime {
    pub fn new(
        handle: AgentHandle,
        executor: Arc<dyn AgentExecutor>,
        idle_interval: Duration,
    ) -> Self {
        Self {
            handle,
            executor,
            idle_interval,
        }
    }

    /// Execute at most one task. Returns whether a task was picked up.
    pub async fn run_once(&self) -> bool {
        let agent = self.handle.status().await;
        if !agent.is_active {
            return false;
        }

        let Some(task) = self.handle.start_next_task().await else {
            return false;
        };

        let outcome = self.executor.execute(&agent, &task).await;
        if self.handle.report(task.id, outcome).await.is_none() {
            debug!(agent_id = %agent.id, task_id = %task.id, "Outcome dropped, task was aborted");
        }
        true
    }

    /// Drive the agent until `shutdown` flips to `true` or its sender is
    /// dropped. A task already executing is allowed to finish.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let agent_id = self.handle.agent_id().to_string();
            info!(agent_id = %agent_id, "Agent runtime started");

            loop {
                if *shutdown.borrow() {
                    break;
                }
                if self.run_once().await {
                    continue;
                }

                tokio::select! {
                    _ = self.handle.notified() => {}
                    _ = tokio::time::sleep(self.idle_interval) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }

            info!(agent_id = %agent_id, "Agent runtime stopped");
        })
    }
}
