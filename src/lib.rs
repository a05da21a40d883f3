//! Agent Dispatch: priority task queues and a supervisor for a set of
//! cooperating agents.

pub mod agents;
pub mod api;
pub mod commands;
pub mod config;
pub mod error;
pub mod runtime;
pub mod supervisor;
pub mod tasks;
