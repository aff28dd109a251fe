//! Sandbox executor error types.

use thiserror::Error;

/// Result type for sandbox operations.
pub type SandboxResult<T> = Result<T, SandboxError>;

/// Errors that can occur talking to the sandbox service.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// The service could not create or resume a sandbox (quota,
    /// misconfiguration, network).
    #[error("sandbox provisioning failed: {0}")]
    Provisioning(String),

    /// The sandbox ran but the command failed.
    #[error("command failed in sandbox {sandbox}: {message}")]
    Command { sandbox: String, message: String },

    /// No live sandbox for the given handle.
    #[error("sandbox not found: {0}")]
    NotFound(String),

    /// HTTP request failed.
    #[error("sandbox request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Service returned an error response.
    #[error("sandbox service error: {message} (code: {code})")]
    Api { message: String, code: String },

    /// Failed to parse a service response.
    #[error("failed to parse sandbox response: {0}")]
    Parse(String),
}
