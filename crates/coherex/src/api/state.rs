//! Application state shared across handlers.

use std::sync::Arc;

use crate::agent::AgentRepository;
use crate::execution::ExecutionRepository;
use crate::sandbox::SandboxExecutor;
use crate::session::SessionService;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Session service for managing session lifecycles.
    pub sessions: Arc<SessionService>,
    /// Agent configuration store.
    pub agents: Arc<AgentRepository>,
    /// Execution audit trail.
    pub executions: Arc<ExecutionRepository>,
    /// Sandbox executor, used directly for ephemeral one-shots.
    pub sandbox: Arc<dyn SandboxExecutor>,
    /// Whether provisioning failures fall back to simulation mode.
    pub simulation_fallback: bool,
    /// Sandbox lifetime ceiling for ephemeral executions.
    pub sandbox_timeout_seconds: u64,
}

impl AppState {
    /// Create new application state.
    pub fn new(
        sessions: SessionService,
        agents: AgentRepository,
        executions: ExecutionRepository,
        sandbox: Arc<dyn SandboxExecutor>,
    ) -> Self {
        Self {
            sessions: Arc::new(sessions),
            agents: Arc::new(agents),
            executions: Arc::new(executions),
            sandbox,
            simulation_fallback: true,
            sandbox_timeout_seconds: 300,
        }
    }

    /// Disable the simulation fallback; provisioning failures become hard
    /// errors.
    pub fn without_simulation_fallback(mut self) -> Self {
        self.simulation_fallback = false;
        self
    }

    /// Override the sandbox lifetime ceiling for ephemeral executions.
    pub fn with_sandbox_timeout(mut self, seconds: u64) -> Self {
        self.sandbox_timeout_seconds = seconds;
        self
    }
}
