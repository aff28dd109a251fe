//! Session data models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Sandbox is live and recently used.
    Active,
    /// Sandbox is live but has been inactive past the idle threshold.
    /// Transition rules are identical to Active.
    Idle,
    /// Sandbox torn down; session row and conversation log retained.
    Hibernated,
    /// Terminal. No outgoing transitions.
    Stopped,
}

impl SessionStatus {
    /// Whether a sandbox handle is held in this status.
    pub fn holds_sandbox(&self) -> bool {
        matches!(self, SessionStatus::Active | SessionStatus::Idle)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Active => write!(f, "active"),
            SessionStatus::Idle => write!(f, "idle"),
            SessionStatus::Hibernated => write!(f, "hibernated"),
            SessionStatus::Stopped => write!(f, "stopped"),
        }
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(SessionStatus::Active),
            "idle" => Ok(SessionStatus::Idle),
            "hibernated" => Ok(SessionStatus::Hibernated),
            "stopped" => Ok(SessionStatus::Stopped),
            _ => Err(format!("unknown session status: {}", s)),
        }
    }
}

impl TryFrom<String> for SessionStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A sandbox-backed agent session.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Session {
    /// Unique session ID.
    pub id: String,
    /// Owning agent.
    pub agent_id: String,
    /// Handle of the live sandbox. Non-null iff status is active or idle.
    pub sandbox_ref: Option<String>,
    /// Current session status.
    #[sqlx(try_from = "String")]
    pub status: SessionStatus,
    /// When the session was created.
    pub created_at: String,
    /// Updated on every successful execution.
    pub last_activity_at: String,
}

impl Session {
    /// Check if the session is in its terminal state.
    pub fn is_stopped(&self) -> bool {
        matches!(self.status, SessionStatus::Stopped)
    }

    /// Check if the session holds a live sandbox (active or idle).
    pub fn is_live(&self) -> bool {
        self.status.holds_sandbox()
    }
}

/// Role of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

impl std::fmt::Display for TurnRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TurnRole::User => write!(f, "user"),
            TurnRole::Assistant => write!(f, "assistant"),
        }
    }
}

impl std::str::FromStr for TurnRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(TurnRole::User),
            "assistant" => Ok(TurnRole::Assistant),
            _ => Err(format!("unknown turn role: {}", s)),
        }
    }
}

impl TryFrom<String> for TurnRole {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// One conversation turn. Only consulted for persistent-mode agents.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Turn {
    pub session_id: String,
    pub seq: i64,
    #[sqlx(try_from = "String")]
    pub role: TurnRole,
    pub content: String,
    pub created_at: String,
}

/// Request to create (or reuse) a session for an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    /// Owning agent.
    pub agent_id: String,
    /// Always provision a fresh session instead of reusing a live one.
    #[serde(default)]
    pub force_new: bool,
}

/// Request to execute input within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub input: String,
    /// Replay prior conversation turns into the effective prompt.
    #[serde(default = "default_include_context")]
    pub include_context: bool,
}

fn default_include_context() -> bool {
    true
}

/// Result of a single in-session execution.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub session_id: String,
    pub output: String,
    pub duration_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            SessionStatus::Active,
            SessionStatus::Idle,
            SessionStatus::Hibernated,
            SessionStatus::Stopped,
        ] {
            let parsed: SessionStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_holds_sandbox() {
        assert!(SessionStatus::Active.holds_sandbox());
        assert!(SessionStatus::Idle.holds_sandbox());
        assert!(!SessionStatus::Hibernated.holds_sandbox());
        assert!(!SessionStatus::Stopped.holds_sandbox());
    }
}
