//! Agent data models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// How an agent's executions relate to sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Each invocation gets a fresh, disposable sandbox.
    Ephemeral,
    /// Invocations share a long-lived session and sandbox; conversation
    /// history is retained and replayed.
    Persistent,
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionMode::Ephemeral => write!(f, "ephemeral"),
            ExecutionMode::Persistent => write!(f, "persistent"),
        }
    }
}

impl std::str::FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ephemeral" => Ok(ExecutionMode::Ephemeral),
            "persistent" => Ok(ExecutionMode::Persistent),
            _ => Err(format!("unknown execution mode: {}", s)),
        }
    }
}

impl TryFrom<String> for ExecutionMode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Agent lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Draft,
    Active,
    Paused,
    Archived,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentStatus::Draft => write!(f, "draft"),
            AgentStatus::Active => write!(f, "active"),
            AgentStatus::Paused => write!(f, "paused"),
            AgentStatus::Archived => write!(f, "archived"),
        }
    }
}

impl std::str::FromStr for AgentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(AgentStatus::Draft),
            "active" => Ok(AgentStatus::Active),
            "paused" => Ok(AgentStatus::Paused),
            "archived" => Ok(AgentStatus::Archived),
            _ => Err(format!("unknown agent status: {}", s)),
        }
    }
}

impl TryFrom<String> for AgentStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A configured agent.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AgentConfig {
    /// Unique agent ID.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Execution mode (ephemeral or persistent).
    #[sqlx(try_from = "String")]
    pub execution_mode: ExecutionMode,
    /// Current status. Only draft and active agents are executable.
    #[sqlx(try_from = "String")]
    pub status: AgentStatus,
    /// Model identifier passed through to the sandbox.
    pub model: String,
    /// Sampling temperature.
    pub temperature: Option<f64>,
    /// Maximum output tokens.
    pub max_tokens: Option<i64>,
    /// System prompt prepended to every execution.
    pub system_prompt: Option<String>,
    /// When the agent was created.
    pub created_at: String,
}

impl AgentConfig {
    /// Check whether this agent may be executed at all.
    pub fn is_executable(&self) -> bool {
        matches!(self.status, AgentStatus::Draft | AgentStatus::Active)
    }
}

/// Request to register a new agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAgentRequest {
    pub name: String,
    pub execution_mode: ExecutionMode,
    #[serde(default)]
    pub status: Option<AgentStatus>,
    pub model: String,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<i64>,
    #[serde(default)]
    pub system_prompt: Option<String>,
}
