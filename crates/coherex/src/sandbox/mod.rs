//! Sandbox executor interface.
//!
//! The remote code-execution service is opaque: the session core only maps
//! sessions to sandbox handles and dispatches commands. Implementations:
//! [`HttpSandboxExecutor`] for the real service, [`SimulatedExecutor`] for
//! the explicit degraded fallback and for tests.

mod error;
mod http;
mod sim;

pub use error::{SandboxError, SandboxResult};
pub use http::HttpSandboxExecutor;
pub use sim::SimulatedExecutor;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Opaque handle correlating a session to a live sandbox instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SandboxRef(pub String);

impl SandboxRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SandboxRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Options for provisioning a sandbox.
#[derive(Debug, Clone, Serialize)]
pub struct SandboxOptions {
    /// Sandbox lifetime ceiling, enforced by the remote service.
    pub timeout_seconds: u64,
}

impl Default for SandboxOptions {
    fn default() -> Self {
        // The remote service reaps sandboxes after this ceiling regardless
        // of what the session core does.
        Self {
            timeout_seconds: 300,
        }
    }
}

/// Output of a single command run inside a sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOutput {
    pub output: String,
    #[serde(default)]
    pub error: Option<String>,
}

/// Remote code-execution environment, keyed by sandbox handle.
#[async_trait]
pub trait SandboxExecutor: Send + Sync {
    /// Provision a new sandbox for the given correlation id.
    async fn create_sandbox(&self, id: &str, opts: &SandboxOptions) -> SandboxResult<SandboxRef>;

    /// Run a command inside a live sandbox.
    async fn run_command(&self, sandbox: &SandboxRef, command: &str)
    -> SandboxResult<CommandOutput>;

    /// Upload a file into the sandbox filesystem.
    async fn upload_file(
        &self,
        sandbox: &SandboxRef,
        path: &str,
        contents: &[u8],
    ) -> SandboxResult<()>;

    /// Download a file from the sandbox filesystem.
    async fn download_file(&self, sandbox: &SandboxRef, path: &str) -> SandboxResult<Vec<u8>>;

    /// Tear down a sandbox, releasing its resources.
    async fn destroy_sandbox(&self, sandbox: &SandboxRef) -> SandboxResult<()>;
}
