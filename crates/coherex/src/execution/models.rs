//! Execution audit models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Status of one audited execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    /// Terminal statuses carry a completion timestamp.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStatus::Pending => write!(f, "pending"),
            ExecutionStatus::Running => write!(f, "running"),
            ExecutionStatus::Completed => write!(f, "completed"),
            ExecutionStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ExecutionStatus::Pending),
            "running" => Ok(ExecutionStatus::Running),
            "completed" => Ok(ExecutionStatus::Completed),
            "failed" => Ok(ExecutionStatus::Failed),
            _ => Err(format!("unknown execution status: {}", s)),
        }
    }
}

impl TryFrom<String> for ExecutionStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// One audited invocation. Append-only; rows are never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExecutionRecord {
    /// Unique execution ID.
    pub id: String,
    /// Agent that was executed.
    pub agent_id: String,
    /// Session, for persistent-mode executions only.
    pub session_id: Option<String>,
    /// Raw input.
    pub input: String,
    /// Output, set on completion (including simulated output).
    pub output: Option<String>,
    /// Current status.
    #[sqlx(try_from = "String")]
    pub status: ExecutionStatus,
    /// Whether the output came from the simulation fallback.
    pub simulated: bool,
    /// When the record was created.
    pub started_at: String,
    /// Set iff status is completed or failed.
    pub completed_at: Option<String>,
    /// Wall-clock duration, set on completion.
    pub duration_ms: Option<i64>,
    /// Free-form log lines, JSON array.
    #[sqlx(json)]
    pub logs: Vec<String>,
}

/// Outcome of an agent-level execution, as returned to callers.
///
/// A simulated outcome is a tagged variant, never an untyped flag, so a
/// degraded response cannot be mistaken for a genuine one.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ExecutionOutcome {
    /// The sandbox really ran the input.
    Real { output: String },
    /// Provisioning failed and the configured fallback produced a mocked
    /// response instead.
    Simulated { output: String, reason: String },
}

impl ExecutionOutcome {
    pub fn output(&self) -> &str {
        match self {
            ExecutionOutcome::Real { output } => output,
            ExecutionOutcome::Simulated { output, .. } => output,
        }
    }

    pub fn is_simulated(&self) -> bool {
        matches!(self, ExecutionOutcome::Simulated { .. })
    }
}
