//! Console commands for driving the supervisor from stdin.
//!
//! `@agent[:priority] text` queues an instruction; everything else is a
//! slash command. [`execute`] runs a parsed command and renders the reply.

use std::fmt::Write as _;

use uuid::Uuid;

use crate::agents::{AgentMode, Message};
use crate::supervisor::{Delivery, Supervisor};
use crate::tasks::{Priority, Task};

/// A parsed line of console input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    QueueInstruction {
        agent_id: String,
        priority: Option<Priority>,
        text: String,
    },
    Agents,
    Status { agent_id: String },
    ShowQueue { agent_id: String },
    History { agent_id: String, limit: Option<usize> },
    ClearHistory { agent_id: String },
    Reset { agent_id: String },
    Activate { agent_id: String },
    Deactivate { agent_id: String },
    SetMode { agent_id: String, mode: AgentMode },
    Abort { agent_id: String, task_id: Uuid },
    Rerun { agent_id: String, task_id: Uuid },
    Help,
    Quit,
    /// Blank line.
    Empty,
    Invalid { reason: String },
}

/// Parses console input into [`ConsoleCommand`]s.
pub struct CommandParser;

impl CommandParser {
    pub fn parse(input: &str) -> ConsoleCommand {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return ConsoleCommand::Empty;
        }
        if let Some(rest) = trimmed.strip_prefix('@') {
            return parse_instruction(rest);
        }
        if !trimmed.starts_with('/') {
            return invalid("Address an agent with @agent-id, or type /help");
        }

        let mut parts = trimmed.split_whitespace();
        let command = parts.next().unwrap_or_default().to_lowercase();
        let args: Vec<&str> = parts.collect();

        match command.as_str() {
            "/help" | "/?" => ConsoleCommand::Help,
            "/quit" | "/exit" => ConsoleCommand::Quit,
            "/agents" => ConsoleCommand::Agents,
            "/status" => with_agent(&args, |agent_id| ConsoleCommand::Status { agent_id }),
            "/queue" => with_agent(&args, |agent_id| ConsoleCommand::ShowQueue { agent_id }),
            "/activate" => with_agent(&args, |agent_id| ConsoleCommand::Activate { agent_id }),
            "/deactivate" => with_agent(&args, |agent_id| ConsoleCommand::Deactivate { agent_id }),
            "/history" => parse_history(&args),
            "/clear" => with_agent(&args, |agent_id| ConsoleCommand::ClearHistory { agent_id }),
            "/reset" => with_agent(&args, |agent_id| ConsoleCommand::Reset { agent_id }),
            "/mode" => parse_mode(&args),
            "/abort" => parse_task_command(&args, |agent_id, task_id| ConsoleCommand::Abort {
                agent_id,
                task_id,
            }),
            "/rerun" => parse_task_command(&args, |agent_id, task_id| ConsoleCommand::Rerun {
                agent_id,
                task_id,
            }),
            other => invalid(format!("Unknown command {other}, type /help")),
        }
    }
}

fn invalid(reason: impl Into<String>) -> ConsoleCommand {
    ConsoleCommand::Invalid {
        reason: reason.into(),
    }
}

/// `@agent[:priority] text`
fn parse_instruction(rest: &str) -> ConsoleCommand {
    let Some((target, text)) = rest.split_once(char::is_whitespace) else {
        return invalid("Usage: @agent[:priority] instruction");
    };
    let text = text.trim();
    if text.is_empty() {
        return invalid("Instruction text is empty");
    }

    let (agent_id, priority) = match target.split_once(':') {
        Some((agent, label)) => match label.to_ascii_lowercase().as_str() {
            "high" | "normal" | "low" => (agent, Some(Priority::parse_lenient(label))),
            _ => return invalid(format!("Unknown priority {label}, use high, normal or low")),
        },
        None => (target, None),
    };
    if agent_id.is_empty() {
        return invalid("Usage: @agent[:priority] instruction");
    }

    ConsoleCommand::QueueInstruction {
        agent_id: agent_id.to_string(),
        priority,
        text: text.to_string(),
    }
}

fn with_agent(args: &[&str], build: impl FnOnce(String) -> ConsoleCommand) -> ConsoleCommand {
    match args {
        [agent_id] => build(agent_id.to_string()),
        _ => invalid("Expected exactly one agent id"),
    }
}

/// `/history <agent> [n]`
fn parse_history(args: &[&str]) -> ConsoleCommand {
    match args {
        [agent_id] => ConsoleCommand::History {
            agent_id: agent_id.to_string(),
            limit: None,
        },
        [agent_id, n] => match n.parse() {
            Ok(limit) => ConsoleCommand::History {
                agent_id: agent_id.to_string(),
                limit: Some(limit),
            },
            Err(_) => invalid(format!("Invalid limit: {n}")),
        },
        _ => invalid("Usage: /history <agent> [n]"),
    }
}

/// `/mode <agent> <autonomous|supervised>`
fn parse_mode(args: &[&str]) -> ConsoleCommand {
    match args {
        [agent_id, mode] => match mode.to_lowercase().parse() {
            Ok(mode) => ConsoleCommand::SetMode {
                agent_id: agent_id.to_string(),
                mode,
            },
            Err(reason) => invalid(reason),
        },
        _ => invalid("Usage: /mode <agent> <autonomous|supervised>"),
    }
}

/// `/abort <agent> <task-id>`, `/rerun <agent> <task-id>`
fn parse_task_command(
    args: &[&str],
    build: impl FnOnce(String, Uuid) -> ConsoleCommand,
) -> ConsoleCommand {
    match args {
        [agent_id, task_id] => match Uuid::parse_str(task_id) {
            Ok(task_id) => build(agent_id.to_string(), task_id),
            Err(_) => invalid(format!("Invalid task id: {task_id}")),
        },
        _ => invalid("Expected an agent id and a task id"),
    }
}

pub const HELP: &str = "\
Commands:
  @agent[:priority] text    queue an instruction (priority: high, normal, low)
  /agents                   list agents
  /status <agent>           show one agent
  /queue <agent>            show queue counters
  /history <agent> [n]      recent completed and failed tasks
  /clear <agent>            drop finished tasks from history
  /reset <agent>            wipe the queue, active task and counters
  /activate <agent>         allow the agent to run tasks
  /deactivate <agent>       pause the agent, its queue is kept
  /mode <agent> <mode>      autonomous or supervised
  /abort <agent> <task-id>  abort a pending or active task
  /rerun <agent> <task-id>  queue a finished task again
  /help                     this text
  /quit                     exit";

/// Run a command against the supervisor and render the reply. `None` means
/// the console should exit.
pub async fn execute(supervisor: &Supervisor, command: ConsoleCommand) -> Option<String> {
    let reply = match command {
        ConsoleCommand::Quit => return None,
        ConsoleCommand::Empty => String::new(),
        ConsoleCommand::Help => HELP.to_string(),
        ConsoleCommand::Invalid { reason } => reason,
        other => run(supervisor, other)
            .await
            .unwrap_or_else(|e| format!("Error: {e}")),
    };
    Some(reply)
}

async fn run(
    supervisor: &Supervisor,
    command: ConsoleCommand,
) -> Result<String, crate::error::SupervisorError> {
    let reply = match command {
        ConsoleCommand::QueueInstruction {
            agent_id,
            priority,
            text,
        } => {
            let task = supervisor.queue_instruction(&agent_id, text, priority).await?;
            format!("Queued {} for {} ({})", task.id, agent_id, task.priority())
        }
        ConsoleCommand::Agents => {
            let mut out = String::new();
            for agent in supervisor.all_agents_status().await {
                let _ = writeln!(
                    out,
                    "{:<16} {:<8} {:<11} {}",
                    agent.id,
                    if agent.is_active { "active" } else { "inactive" },
                    agent.mode,
                    agent.current_task.as_deref().unwrap_or("-"),
                );
            }
            out.trim_end().to_string()
        }
        ConsoleCommand::Status { agent_id } => {
            let agent = supervisor.agent_status(&agent_id).await?;
            let mut out = format!(
                "{} ({}): {}, {}",
                agent.name,
                agent.id,
                if agent.is_active { "active" } else { "inactive" },
                agent.mode
            );
            if let Some(task) = &agent.current_task {
                let _ = write!(out, "\n  working on: {task}");
            }
            if let Some(warning) = agent.warnings.last() {
                let _ = write!(out, "\n  last warning: {warning}");
            }
            out
        }
        ConsoleCommand::ShowQueue { agent_id } => {
            let state = supervisor.queue_state(&agent_id).await?;
            let d = state.priority_distribution;
            format!(
                "total {} | pending {} (high {}, normal {}, low {}) | active {} | completed {} | failed {}",
                state.total, state.pending, d.high, d.normal, d.low, state.active, state.completed, state.failed
            )
        }
        ConsoleCommand::History { agent_id, limit } => {
            let (completed, failed) = supervisor.history(&agent_id, limit).await?;
            let mut out = String::from("Completed:");
            render_tasks(&mut out, &completed);
            out.push_str("\nFailed:");
            render_tasks(&mut out, &failed);
            out
        }
        ConsoleCommand::ClearHistory { agent_id } => {
            let cleared = supervisor.clear_history(&agent_id).await?;
            format!("Cleared {cleared} finished tasks for {agent_id}")
        }
        ConsoleCommand::Reset { agent_id } => {
            supervisor.reset_queue(&agent_id).await?;
            format!("Reset queue for {agent_id}")
        }
        ConsoleCommand::Activate { agent_id } => {
            deliver(supervisor, Message::activate("console", agent_id)).await?
        }
        ConsoleCommand::Deactivate { agent_id } => {
            deliver(supervisor, Message::deactivate("console", agent_id)).await?
        }
        ConsoleCommand::SetMode { agent_id, mode } => {
            let agent = supervisor.set_agent_mode(&agent_id, mode).await?;
            format!("{} is now {}", agent.id, agent.mode)
        }
        ConsoleCommand::Abort { agent_id, task_id } => {
            if supervisor.abort_task(&agent_id, task_id).await? {
                format!("Aborted {task_id}")
            } else {
                format!("Task {task_id} is not pending or active")
            }
        }
        ConsoleCommand::Rerun { agent_id, task_id } => {
            let task = supervisor.rerun_task(&agent_id, task_id).await?;
            format!("Queued {} for {}", task.id, agent_id)
        }
        ConsoleCommand::Quit
        | ConsoleCommand::Empty
        | ConsoleCommand::Help
        | ConsoleCommand::Invalid { .. } => String::new(),
    };
    Ok(reply)
}

async fn deliver(
    supervisor: &Supervisor,
    message: Message,
) -> Result<String, crate::error::SupervisorError> {
    let to = message.to.clone();
    let reply = match supervisor.send_message(message).await? {
        Delivery::StatusChanged { agent } if agent.is_active => format!("{to} activated"),
        Delivery::StatusChanged { .. } => format!("{to} deactivated"),
        _ => format!("{to} unchanged"),
    };
    Ok(reply)
}

fn render_tasks(out: &mut String, tasks: &[Task]) {
    if tasks.is_empty() {
        out.push_str(" none");
        return;
    }
    for task in tasks {
        let detail = match (&task.result, &task.error) {
            (_, Some(error)) => error.as_str(),
            (Some(result), None) => result.explanation.as_str(),
            (None, None) => "-",
        };
        let _ = write!(out, "\n  {} [{}] {} -> {}", task.id, task.status, task.instruction.text, detail);
    }
}
