//! Addressed control messages between the supervisor, agents and the UI.
//!
//! Messages are out-of-band: they change whether an agent may execute, not
//! what is in its queue. An agent can be deactivated with tasks pending and
//! they simply wait until it is reactivated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tasks::Priority;

/// Envelope kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    #[default]
    Notification,
    Instruction,
    Status,
    /// Any envelope kind this build does not know about.
    #[serde(other)]
    Other,
}

/// What the message asks the recipient to do.
///
/// The set is closed. Payloads outside it decode to `Unrecognized` and are
/// delivered as a no-op.
///
/// On the wire a payload is either a bare label (`"activate"`) or an object
/// tagged by `action`. It always serializes in the tagged form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case", from = "PayloadRepr")]
pub enum MessagePayload {
    /// Grant execution permission.
    Activate,
    /// Revoke execution permission. The queue is left untouched.
    Deactivate,
    /// Abort the recipient's active task, if it has one.
    Abort,
    /// Admit an instruction, same as `Supervisor::queue_instruction`.
    Instruction {
        text: String,
        #[serde(default)]
        priority: Priority,
    },
    /// Ask for the recipient's status without changing it.
    Ping,
    #[serde(other)]
    Unrecognized,
}

impl MessagePayload {
    /// Map a bare payload label (`"activate"`, `"deactivate"`, ...) onto a
    /// payload. Instructions need a body and cannot be expressed this way.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "activate" => Self::Activate,
            "deactivate" => Self::Deactivate,
            "abort" => Self::Abort,
            "ping" => Self::Ping,
            _ => Self::Unrecognized,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Activate => "activate",
            Self::Deactivate => "deactivate",
            Self::Abort => "abort",
            Self::Instruction { .. } => "instruction",
            Self::Ping => "ping",
            Self::Unrecognized => "unrecognized",
        }
    }
}

#[derive(Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum TaggedPayload {
    Activate,
    Deactivate,
    Abort,
    Instruction {
        text: String,
        #[serde(default)]
        priority: Priority,
    },
    Ping,
    #[serde(other)]
    Unrecognized,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PayloadRepr {
    Label(String),
    Tagged(TaggedPayload),
    Other(serde_json::Value),
}

impl From<PayloadRepr> for MessagePayload {
    fn from(repr: PayloadRepr) -> Self {
        match repr {
            PayloadRepr::Label(label) => Self::from_label(&label),
            PayloadRepr::Tagged(tagged) => match tagged {
                TaggedPayload::Activate => Self::Activate,
                TaggedPayload::Deactivate => Self::Deactivate,
                TaggedPayload::Abort => Self::Abort,
                TaggedPayload::Instruction { text, priority } => {
                    Self::Instruction { text, priority }
                }
                TaggedPayload::Ping => Self::Ping,
                TaggedPayload::Unrecognized => Self::Unrecognized,
            },
            PayloadRepr::Other(_) => Self::Unrecognized,
        }
    }
}

/// A control message addressed to one agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub from: String,
    pub to: String,
    #[serde(rename = "type", default)]
    pub message_type: MessageType,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    pub payload: MessagePayload,
}

impl Message {
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        message_type: MessageType,
        payload: MessagePayload,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            from: from.into(),
            to: to.into(),
            message_type,
            timestamp: Utc::now(),
            payload,
        }
    }

    /// A notification carrying a control payload.
    pub fn notification(
        from: impl Into<String>,
        to: impl Into<String>,
        payload: MessagePayload,
    ) -> Self {
        Self::new(from, to, MessageType::Notification, payload)
    }

    pub fn activate(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::notification(from, to, MessagePayload::Activate)
    }

    pub fn deactivate(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::notification(from, to, MessagePayload::Deactivate)
    }

    pub fn instruction(
        from: impl Into<String>,
        to: impl Into<String>,
        text: impl Into<String>,
        priority: Priority,
    ) -> Self {
        Self::new(
            from,
            to,
            MessageType::Instruction,
            MessagePayload::Instruction {
                text: text.into(),
                priority,
            },
        )
    }
}
