//! Agent identity, activation state and startup configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How much autonomy an agent has when executing its tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentMode {
    /// Acts on instructions without waiting for review.
    #[default]
    Autonomous,
    /// Results are expected to be reviewed before being applied.
    Supervised,
}

impl std::fmt::Display for AgentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Autonomous => write!(f, "autonomous"),
            Self::Supervised => write!(f, "supervised"),
        }
    }
}

impl std::str::FromStr for AgentMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "autonomous" => Ok(Self::Autonomous),
            "supervised" => Ok(Self::Supervised),
            _ => Err(format!("Unknown agent mode: {}", s)),
        }
    }
}

/// Observable state of an agent, owned by the supervisor.
///
/// Only changed in response to control messages, setter calls on the
/// supervisor, or lifecycle callbacks from the agent runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStatus {
    pub id: String,
    pub name: String,
    /// Execution permission. Inactive agents still accept new tasks.
    pub is_active: bool,
    pub mode: AgentMode,
    /// Instruction text of the task being executed, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_task: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_task_id: Option<Uuid>,
    /// Ids of agents this one builds on.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Execution failures reported for this agent, oldest first.
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<DateTime<Utc>>,
}

impl AgentStatus {
    /// Cap on retained warnings per agent.
    pub const MAX_WARNINGS: usize = 50;

    pub(crate) fn touch(&mut self) {
        self.last_activity = Some(Utc::now());
    }

    pub(crate) fn push_warning(&mut self, warning: String) {
        self.warnings.push(warning);
        if self.warnings.len() > Self::MAX_WARNINGS {
            let overflow = self.warnings.len() - Self::MAX_WARNINGS;
            self.warnings.drain(..overflow);
        }
    }
}

/// Everything needed to register an agent with the supervisor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRegistration {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub mode: AgentMode,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl AgentRegistration {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            mode: AgentMode::Autonomous,
            is_active: true,
            dependencies: Vec::new(),
        }
    }

    pub fn with_mode(mut self, mode: AgentMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub fn depends_on(mut self, agent_id: impl Into<String>) -> Self {
        self.dependencies.push(agent_id.into());
        self
    }

    pub(crate) fn into_status(self) -> AgentStatus {
        AgentStatus {
            id: self.id,
            name: self.name,
            is_active: self.is_active,
            mode: self.mode,
            current_task: None,
            current_task_id: None,
            dependencies: self.dependencies,
            warnings: Vec::new(),
            last_activity: None,
        }
    }
}

/// The agents every supervisor starts with: an active autonomous coder,
/// and supervised refactoring and documentation agents that start inactive.
pub fn default_agents() -> Vec<AgentRegistration> {
    vec![
        AgentRegistration::new("coder-agent", "Coder Agent"),
        AgentRegistration::new("refactor-agent", "Refactoring Agent")
            .with_mode(AgentMode::Supervised)
            .inactive()
            .depends_on("coder-agent"),
        AgentRegistration::new("doc-agent", "Documentation Agent")
            .with_mode(AgentMode::Supervised)
            .inactive()
            .depends_on("coder-agent"),
    ]
}

/// Per-agent overrides applied on top of the registered agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfigEntry {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<AgentMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_enabled: Option<bool>,
}

/// Startup configuration for the agent set, usually loaded from JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MasConfig {
    /// Extra agents to register before overrides are applied.
    #[serde(default)]
    pub register: Vec<AgentRegistration>,
    #[serde(default)]
    pub agents: Vec<AgentConfigEntry>,
}
