//! Simulated sandbox executor.
//!
//! Used for the explicit simulation-mode fallback when provisioning fails,
//! and as the executor in tests. Sandboxes live in an in-memory table;
//! commands echo a deterministic response.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use uuid::Uuid;

use super::error::{SandboxError, SandboxResult};
use super::{CommandOutput, SandboxExecutor, SandboxOptions, SandboxRef};

/// In-memory sandbox executor.
#[derive(Debug, Default)]
pub struct SimulatedExecutor {
    state: Mutex<SimState>,
}

#[derive(Debug, Default)]
struct SimState {
    /// Live sandboxes and their uploaded files.
    live: HashMap<String, HashMap<String, Vec<u8>>>,
    /// Every handle ever destroyed, for leak assertions in tests.
    destroyed: HashSet<String>,
    /// Commands dispatched, in order.
    commands: Vec<(String, String)>,
    /// When set, the next create_sandbox call fails with a provisioning error.
    fail_next_create: bool,
    /// When set, the next run_command call fails as a command error.
    fail_next_command: bool,
}

impl SimulatedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next provisioning attempt fail.
    pub fn fail_next_create(&self) {
        self.state.lock().unwrap().fail_next_create = true;
    }

    /// Make the next command dispatch fail.
    pub fn fail_next_command(&self) {
        self.state.lock().unwrap().fail_next_command = true;
    }

    /// Number of currently live sandboxes.
    pub fn live_count(&self) -> usize {
        self.state.lock().unwrap().live.len()
    }

    /// Whether the given handle was explicitly destroyed.
    pub fn was_destroyed(&self, sandbox: &SandboxRef) -> bool {
        self.state.lock().unwrap().destroyed.contains(sandbox.as_str())
    }

    /// Commands dispatched so far, as (sandbox, command) pairs.
    pub fn commands(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().commands.clone()
    }
}

#[async_trait]
impl SandboxExecutor for SimulatedExecutor {
    async fn create_sandbox(&self, id: &str, _opts: &SandboxOptions) -> SandboxResult<SandboxRef> {
        let mut state = self.state.lock().unwrap();
        if std::mem::take(&mut state.fail_next_create) {
            return Err(SandboxError::Provisioning(
                "simulated provisioning failure".to_string(),
            ));
        }

        let handle = format!("sim-{}-{}", &id[..id.len().min(8)], Uuid::new_v4());
        state.live.insert(handle.clone(), HashMap::new());
        Ok(SandboxRef(handle))
    }

    async fn run_command(
        &self,
        sandbox: &SandboxRef,
        command: &str,
    ) -> SandboxResult<CommandOutput> {
        let mut state = self.state.lock().unwrap();
        if !state.live.contains_key(sandbox.as_str()) {
            return Err(SandboxError::NotFound(sandbox.to_string()));
        }
        if std::mem::take(&mut state.fail_next_command) {
            return Err(SandboxError::Command {
                sandbox: sandbox.to_string(),
                message: "simulated command failure".to_string(),
            });
        }

        state
            .commands
            .push((sandbox.to_string(), command.to_string()));

        Ok(CommandOutput {
            output: format!("[simulated] {}", command),
            error: None,
        })
    }

    async fn upload_file(
        &self,
        sandbox: &SandboxRef,
        path: &str,
        contents: &[u8],
    ) -> SandboxResult<()> {
        let mut state = self.state.lock().unwrap();
        let files = state
            .live
            .get_mut(sandbox.as_str())
            .ok_or_else(|| SandboxError::NotFound(sandbox.to_string()))?;
        files.insert(path.to_string(), contents.to_vec());
        Ok(())
    }

    async fn download_file(&self, sandbox: &SandboxRef, path: &str) -> SandboxResult<Vec<u8>> {
        let state = self.state.lock().unwrap();
        let files = state
            .live
            .get(sandbox.as_str())
            .ok_or_else(|| SandboxError::NotFound(sandbox.to_string()))?;
        files
            .get(path)
            .cloned()
            .ok_or_else(|| SandboxError::NotFound(format!("{}:{}", sandbox, path)))
    }

    async fn destroy_sandbox(&self, sandbox: &SandboxRef) -> SandboxResult<()> {
        let mut state = self.state.lock().unwrap();
        state.live.remove(sandbox.as_str());
        state.destroyed.insert(sandbox.to_string());
        Ok(())
    }
}
