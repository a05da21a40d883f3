//! Per-agent priority queue with a single active-task slot.
//!
//! Three FIFO queues (high/normal/low), one active slot, and the completed
//! and failed histories. Everything here is synchronous and in-memory; the
//! owner decides how the manager is shared (see `supervisor::handle`).

use std::collections::VecDeque;

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use super::model::{Instruction, Priority, Task, TaskResult, TaskStatus};

/// Pending counts per priority level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PriorityDistribution {
    pub high: usize,
    pub normal: usize,
    pub low: usize,
}

/// Point-in-time counts for one queue. Computed on demand, never stored.
///
/// `total == pending + active + completed + failed` always holds.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueueState {
    pub total: usize,
    pub pending: usize,
    /// 1 while a task is executing, else 0.
    pub active: usize,
    pub completed: usize,
    /// Failed and aborted tasks.
    pub failed: usize,
    pub priority_distribution: PriorityDistribution,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_task: Option<Task>,
}

/// Lifetime counters. Unaffected by `clear_history`, zeroed by `reset`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub added_count: u64,
    pub completed_count: u64,
    pub failed_count: u64,
    pub aborted_count: u64,
}

/// Priority task queue for a single agent.
#[derive(Debug, Default)]
pub struct TaskQueueManager {
    high: VecDeque<Task>,
    normal: VecDeque<Task>,
    low: VecDeque<Task>,
    active: Option<Task>,
    completed: Vec<Task>,
    failed: Vec<Task>,
    stats: QueueStats,
}

impl TaskQueueManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue_mut(&mut self, priority: Priority) -> &mut VecDeque<Task> {
        match priority {
            Priority::High => &mut self.high,
            Priority::Normal => &mut self.normal,
            Priority::Low => &mut self.low,
        }
    }

    /// Admit an instruction as a new pending task at the back of its
    /// priority queue. Returns the stored task.
    pub fn add_task(&mut self, instruction: Instruction) -> &Task {
        self.push(Task::pending(instruction))
    }

    /// Like [`add_task`](Self::add_task), recording which agent owns the task.
    pub fn add_task_for(&mut self, agent_id: &str, instruction: Instruction) -> &Task {
        let mut task = Task::pending(instruction);
        task.assigned_to = Some(agent_id.to_string());
        self.push(task)
    }

    fn push(&mut self, task: Task) -> &Task {
        self.stats.added_count += 1;
        debug!(task_id = %task.id, priority = %task.priority(), "Task queued");
        let queue = self.queue_mut(task.priority());
        queue.push_back(task);
        &queue[queue.len() - 1]
    }

    /// Promote the next pending task to active.
    ///
    /// Returns `None` without touching the queues while another task is
    /// active, or when nothing is pending. High drains before normal before
    /// low; within a level, oldest first.
    pub fn start_next_task(&mut self) -> Option<&Task> {
        if self.active.is_some() {
            return None;
        }

        let mut next = Priority::ALL
            .into_iter()
            .find_map(|priority| self.queue_mut(priority).pop_front())?;
        next.transition_to(TaskStatus::Active);

        debug!(task_id = %next.id, "Task started");
        self.active = Some(next);
        self.active.as_ref()
    }

    /// Mark the active task completed and move it into history.
    /// Returns the completed task, or `None` if nothing was active.
    pub fn complete_active_task(&mut self, result: TaskResult) -> Option<Task> {
        let mut task = self.active.take()?;
        task.transition_to(TaskStatus::Completed);
        task.result = Some(result);

        self.stats.completed_count += 1;
        self.completed.push(task.clone());
        Some(task)
    }

    /// Mark the active task failed with `error` and move it into history.
    /// Returns the failed task, or `None` if nothing was active.
    pub fn fail_active_task(&mut self, error: impl Into<String>) -> Option<Task> {
        let mut task = self.active.take()?;
        task.transition_to(TaskStatus::Failed);
        task.error = Some(error.into());

        self.stats.failed_count += 1;
        self.failed.push(task.clone());
        Some(task)
    }

    /// Abort a task that is active or still pending. Aborted tasks are filed
    /// under the failed history with status `Aborted`.
    ///
    /// Returns `false` for unknown ids and for tasks that already finished.
    pub fn abort_task(&mut self, task_id: Uuid) -> bool {
        if self.active.as_ref().is_some_and(|t| t.id == task_id) {
            if let Some(mut task) = self.active.take() {
                task.transition_to(TaskStatus::Aborted);
                self.file_aborted(task);
                return true;
            }
        }

        for priority in Priority::ALL {
            let queue = self.queue_mut(priority);
            if let Some(index) = queue.iter().position(|t| t.id == task_id) {
                if let Some(mut task) = queue.remove(index) {
                    task.transition_to(TaskStatus::Aborted);
                    self.file_aborted(task);
                    return true;
                }
            }
        }

        false
    }

    fn file_aborted(&mut self, task: Task) {
        debug!(task_id = %task.id, "Task aborted");
        self.stats.aborted_count += 1;
        self.failed.push(task);
    }

    /// Whether `task_id` is the task currently executing.
    pub fn is_active(&self, task_id: Uuid) -> bool {
        self.active.as_ref().is_some_and(|t| t.id == task_id)
    }

    pub fn active_task(&self) -> Option<&Task> {
        self.active.as_ref()
    }

    pub fn queue_state(&self) -> QueueState {
        let distribution = PriorityDistribution {
            high: self.high.len(),
            normal: self.normal.len(),
            low: self.low.len(),
        };
        let pending = distribution.high + distribution.normal + distribution.low;
        let active = usize::from(self.active.is_some());

        QueueState {
            total: pending + active + self.completed.len() + self.failed.len(),
            pending,
            active,
            completed: self.completed.len(),
            failed: self.failed.len(),
            priority_distribution: distribution,
            active_task: self.active.clone(),
        }
    }

    /// Every task this manager knows about: pending (high, normal, low),
    /// then active, then completed, then failed.
    pub fn all_tasks(&self) -> Vec<Task> {
        self.high
            .iter()
            .chain(self.normal.iter())
            .chain(self.low.iter())
            .chain(self.active.iter())
            .chain(self.completed.iter())
            .chain(self.failed.iter())
            .cloned()
            .collect()
    }

    /// Look up any task by id, wherever it currently lives.
    pub fn find_task(&self, task_id: Uuid) -> Option<&Task> {
        self.high
            .iter()
            .chain(self.normal.iter())
            .chain(self.low.iter())
            .chain(self.active.iter())
            .chain(self.completed.iter())
            .chain(self.failed.iter())
            .find(|t| t.id == task_id)
    }

    /// Completed tasks, most recently finished first.
    pub fn completed_tasks(&self, limit: Option<usize>) -> Vec<Task> {
        most_recent_first(&self.completed, limit)
    }

    /// Failed and aborted tasks, most recently finished first.
    pub fn failed_tasks(&self, limit: Option<usize>) -> Vec<Task> {
        most_recent_first(&self.failed, limit)
    }

    pub fn stats(&self) -> QueueStats {
        self.stats
    }

    /// Drop completed and failed history. Queues, the active task and the
    /// counters are kept.
    pub fn clear_history(&mut self) {
        self.completed.clear();
        self.failed.clear();
    }

    /// Wipe everything, including the active task and the counters.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn high_priority_tasks(&self) -> Vec<Task> {
        self.high.iter().cloned().collect()
    }

    pub fn normal_priority_tasks(&self) -> Vec<Task> {
        self.normal.iter().cloned().collect()
    }

    pub fn low_priority_tasks(&self) -> Vec<Task> {
        self.low.iter().cloned().collect()
    }

    pub fn pending_tasks(&self, priority: Priority) -> Vec<Task> {
        match priority {
            Priority::High => self.high_priority_tasks(),
            Priority::Normal => self.normal_priority_tasks(),
            Priority::Low => self.low_priority_tasks(),
        }
    }
}

fn most_recent_first(history: &[Task], limit: Option<usize>) -> Vec<Task> {
    // Reverse first so that equal timestamps keep the later insertion on top.
    let mut sorted: Vec<Task> = history.iter().rev().cloned().collect();
    sorted.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
    if let Some(limit) = limit {
        sorted.truncate(limit);
    }
    sorted
}
