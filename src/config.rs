//! Configuration types, read from `AGENT_DISPATCH_*` environment variables.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::agents::MasConfig;
use crate::error::ConfigError;

/// Supervisor and agent runtime configuration.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Capacity of the lifecycle event broadcast channel.
    pub event_capacity: usize,
    /// How often an idle runtime re-checks its queue without a wake-up.
    pub idle_poll_interval: Duration,
    /// Latency of the simulated executor.
    pub simulated_latency: Duration,
    /// JSON file with extra agents and per-agent overrides.
    pub agents_file: Option<PathBuf>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            event_capacity: 256,
            idle_poll_interval: Duration::from_millis(500),
            simulated_latency: Duration::from_millis(2000),
            agents_file: None,
        }
    }
}

impl SupervisorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unset keys fall back to defaults;
    /// set but unparsable keys are an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let event_capacity = parse_or(&lookup, "AGENT_DISPATCH_EVENT_CAPACITY", defaults.event_capacity)?;
        if event_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "AGENT_DISPATCH_EVENT_CAPACITY".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        let idle_ms = parse_or(&lookup, "AGENT_DISPATCH_IDLE_POLL_MS", 500u64)?;
        let latency_ms = parse_or(&lookup, "AGENT_DISPATCH_SIMULATED_LATENCY_MS", 2000u64)?;
        let agents_file = lookup("AGENT_DISPATCH_AGENTS_FILE")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        Ok(Self {
            event_capacity,
            idle_poll_interval: Duration::from_millis(idle_ms),
            simulated_latency: Duration::from_millis(latency_ms),
            agents_file,
        })
    }
}

/// HTTP/WebSocket control surface configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8080,
        }
    }
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            enabled: parse_or(&lookup, "AGENT_DISPATCH_API_ENABLED", true)?,
            port: parse_or(&lookup, "AGENT_DISPATCH_API_PORT", 8080u16)?,
        })
    }
}

/// Read a [`MasConfig`] from a JSON file.
pub fn load_mas_config(path: &Path) -> Result<MasConfig, ConfigError> {
    let raw = std::fs::read_to_string(path)?;
    serde_json::from_str(&raw)
        .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{raw:?}: {e}"),
        }),
    }
}
