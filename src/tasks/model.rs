//! Task data model: priorities, lifecycle states, instructions and results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Dequeue precedence of a pending task. `High > Normal > Low`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl Priority {
    /// All levels, highest first. This is the dequeue order.
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Normal, Priority::Low];

    /// Parse a priority label. Anything unrecognised is `Normal`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Self::High,
            "low" => Self::Low,
            _ => Self::Normal,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
        }
    }
}

impl From<String> for Priority {
    fn from(s: String) -> Self {
        Self::parse_lenient(&s)
    }
}

impl From<&str> for Priority {
    fn from(s: &str) -> Self {
        Self::parse_lenient(s)
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a task.
///
/// `Pending → Active → {Completed | Failed | Aborted}`, plus `Pending → Aborted`
/// for tasks cancelled before they ever ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting in one of the priority queues.
    Pending,
    /// The single task currently executing for its agent.
    Active,
    /// Finished successfully.
    Completed,
    /// The runtime reported an execution failure.
    Failed,
    /// Cancelled by an operator, before or during execution.
    Aborted,
}

impl TaskStatus {
    /// Check if this state allows transitioning to another state.
    pub fn can_transition_to(&self, target: TaskStatus) -> bool {
        use TaskStatus::*;

        matches!(
            (self, target),
            (Pending, Active)
                | (Pending, Aborted)
                | (Active, Completed)
                | (Active, Failed)
                | (Active, Aborted)
        )
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Aborted)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        };
        write!(f, "{s}")
    }
}

/// A request addressed to an agent, before it is wrapped into a [`Task`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    /// Assigned by the queue manager on admission when absent.
    #[serde(default)]
    pub id: Option<Uuid>,
    /// What the agent is asked to do.
    pub text: String,
    /// Queue placement; unrecognised labels deserialize as `normal`.
    #[serde(default)]
    pub priority: Priority,
}

impl Instruction {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: None,
            text: text.into(),
            priority: Priority::Normal,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }
}

/// Outcome reported by the agent runtime when a task completes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Short human-readable account of what was done.
    #[serde(default)]
    pub explanation: String,
    /// Follow-up suggestions surfaced to the user.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
    /// Arbitrary structured output (generated code, diffs, ...).
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub output: serde_json::Value,
}

impl TaskResult {
    pub fn new(explanation: impl Into<String>) -> Self {
        Self {
            explanation: explanation.into(),
            ..Default::default()
        }
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }

    pub fn with_output(mut self, output: serde_json::Value) -> Self {
        self.output = output;
        self
    }
}

/// A schedulable unit of work owned by one agent's queue manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub instruction: Instruction,
    /// Agent this task was admitted for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Task {
    /// Wrap an instruction into a fresh pending task, assigning the
    /// instruction an id if it has none.
    pub fn pending(mut instruction: Instruction) -> Self {
        instruction.id.get_or_insert_with(Uuid::new_v4);
        Self {
            id: Uuid::new_v4(),
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            instruction,
            assigned_to: None,
            result: None,
            error: None,
        }
    }

    pub fn priority(&self) -> Priority {
        self.instruction.priority
    }

    /// Move to `target`, stamping the matching timestamp. Returns `false`
    /// (and leaves the task untouched) for an illegal transition.
    pub(crate) fn transition_to(&mut self, target: TaskStatus) -> bool {
        if !self.status.can_transition_to(target) {
            return false;
        }
        self.status = target;
        match target {
            TaskStatus::Active => self.started_at = Some(Utc::now()),
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Aborted => {
                self.completed_at = Some(Utc::now());
            }
            TaskStatus::Pending => {}
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_order() {
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
        assert_eq!(Priority::ALL[0], Priority::High);
    }

    #[test]
    fn unrecognised_priority_is_normal() {
        assert_eq!(Priority::parse_lenient("urgent"), Priority::Normal);
        assert_eq!(Priority::parse_lenient(""), Priority::Normal);
        assert_eq!(Priority::parse_lenient(" HIGH "), Priority::High);
        assert_eq!(Priority::from("low"), Priority::Low);
    }

    #[test]
    fn instruction_deserializes_with_lenient_priority() {
        let parsed: Instruction =
            serde_json::from_str(r#"{"text": "A", "priority": "critical"}"#).unwrap();
        assert_eq!(parsed.priority, Priority::Normal);
        assert!(parsed.id.is_none());

        let parsed: Instruction = serde_json::from_str(r#"{"text": "B"}"#).unwrap();
        assert_eq!(parsed.priority, Priority::Normal);

        let parsed: Instruction =
            serde_json::from_str(r#"{"text": "C", "priority": "high"}"#).unwrap();
        assert_eq!(parsed.priority, Priority::High);
    }

    #[test]
    fn status_transitions() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Active));
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Aborted));
        assert!(TaskStatus::Active.can_transition_to(TaskStatus::Completed));
        assert!(TaskStatus::Active.can_transition_to(TaskStatus::Failed));
        assert!(TaskStatus::Active.can_transition_to(TaskStatus::Aborted));

        assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::Completed));
        assert!(!TaskStatus::Completed.can_transition_to(TaskStatus::Aborted));
        assert!(!TaskStatus::Failed.can_transition_to(TaskStatus::Active));
        assert!(!TaskStatus::Aborted.can_transition_to(TaskStatus::Pending));
    }

    #[test]
    fn terminal_states() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Aborted.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Active.is_terminal());
    }

    #[test]
    fn pending_task_gets_instruction_id() {
        let task = Task::pending(Instruction::new("write tests"));
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.instruction.id.is_some());
        assert!(task.started_at.is_none());

        let fixed = Uuid::new_v4();
        let task = Task::pending(Instruction::new("keep id").with_id(fixed));
        assert_eq!(task.instruction.id, Some(fixed));
    }

    #[test]
    fn transition_stamps_timestamps() {
        let mut task = Task::pending(Instruction::new("x"));
        assert!(task.transition_to(TaskStatus::Active));
        assert!(task.started_at.is_some());
        assert!(task.completed_at.is_none());

        assert!(task.transition_to(TaskStatus::Completed));
        assert!(task.completed_at.is_some());

        // Terminal tasks are never resurrected.
        assert!(!task.transition_to(TaskStatus::Active));
        assert_eq!(task.status, TaskStatus::Completed);
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&TaskStatus::Aborted).unwrap(),
            "\"aborted\""
        );
        assert_eq!(TaskStatus::Active.to_string(), "active");
    }
}
