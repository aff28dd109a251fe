//! Session manager error taxonomy.

use thiserror::Error;

use crate::sandbox::SandboxError;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors surfaced by the session manager.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Referenced session does not exist.
    #[error("session not found: {0}")]
    NotFound(String),

    /// Referenced agent does not exist.
    #[error("agent not found: {0}")]
    AgentNotFound(String),

    /// The requested transition is illegal for the session's current status.
    #[error("invalid session state: {0}")]
    InvalidState(String),

    /// A persistent-session operation was requested for an ephemeral agent.
    #[error("unsupported execution mode: {0}")]
    UnsupportedMode(String),

    /// The sandbox service failed to provision a sandbox.
    #[error("sandbox provisioning failed")]
    Provisioning(#[source] SandboxError),

    /// The sandbox ran but the command failed.
    #[error("execution failed: {0}")]
    Execution(String),

    /// Session store failure.
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}
