//! Session service - orchestrates session state transitions.
//!
//! Single authority for the lifecycle
//! `active/idle -> hibernated -> active`, `* -> stopped`. All executions
//! and transitions for one session are serialized through a per-session
//! async lock, so conversation turns append in a strict order and two
//! concurrent transitions cannot both succeed.

use anyhow::anyhow;
use chrono::Utc;
use dashmap::DashMap;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::agent::{AgentConfig, ExecutionMode};
use crate::sandbox::{SandboxExecutor, SandboxOptions, SandboxRef};

use super::error::{SessionError, SessionResult};
use super::models::{ExecutionResult, Session, SessionStatus, Turn};
use super::repository::SessionRepository;

/// Session service configuration.
#[derive(Debug, Clone)]
pub struct SessionServiceConfig {
    /// Sandbox lifetime ceiling passed to the executor on provisioning.
    pub sandbox_timeout_seconds: u64,
    /// Inactivity after which an active session is demoted to idle.
    pub idle_after: Duration,
    /// Inactivity after which an idle session is hibernated.
    pub hibernate_after: Duration,
}

impl Default for SessionServiceConfig {
    fn default() -> Self {
        Self {
            sandbox_timeout_seconds: 300,
            idle_after: Duration::from_secs(10 * 60),
            hibernate_after: Duration::from_secs(60 * 60),
        }
    }
}

/// Service for managing agent sessions.
#[derive(Clone)]
pub struct SessionService {
    repo: SessionRepository,
    executor: Arc<dyn SandboxExecutor>,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    config: SessionServiceConfig,
}

impl SessionService {
    /// Create a new session service.
    pub fn new(
        repo: SessionRepository,
        executor: Arc<dyn SandboxExecutor>,
        config: SessionServiceConfig,
    ) -> Self {
        Self {
            repo,
            executor,
            locks: Arc::new(DashMap::new()),
            config,
        }
    }

    fn lock_for(&self, session_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn sandbox_options(&self) -> SandboxOptions {
        SandboxOptions {
            timeout_seconds: self.config.sandbox_timeout_seconds,
        }
    }

    /// Return the agent's live session, provisioning a new one if needed.
    ///
    /// Persistent sessions are not defined for ephemeral agents; those
    /// callers get `UnsupportedMode`.
    pub async fn get_or_create_session(
        &self,
        agent: &AgentConfig,
        force_new: bool,
    ) -> SessionResult<Session> {
        if agent.execution_mode == ExecutionMode::Ephemeral {
            return Err(SessionError::UnsupportedMode(format!(
                "agent {} is ephemeral; sessions only exist for persistent agents",
                agent.id
            )));
        }
        if !agent.is_executable() {
            return Err(SessionError::InvalidState(format!(
                "agent {} is {} and cannot be executed",
                agent.id, agent.status
            )));
        }

        if !force_new {
            if let Some(existing) = self.repo.find_live_by_agent(&agent.id).await? {
                debug!(
                    "Reusing session {} ({}) for agent {}",
                    existing.id, existing.status, agent.id
                );
                return Ok(existing);
            }
        }

        let session_id = Uuid::new_v4().to_string();
        let sandbox = self
            .executor
            .create_sandbox(&session_id, &self.sandbox_options())
            .await
            .map_err(SessionError::Provisioning)?;

        let now = Utc::now().to_rfc3339();
        let session = Session {
            id: session_id,
            agent_id: agent.id.clone(),
            sandbox_ref: Some(sandbox.to_string()),
            status: SessionStatus::Active,
            created_at: now.clone(),
            last_activity_at: now,
        };
        self.repo.create(&session).await?;

        info!(
            "Created session {} for agent {} (sandbox {})",
            session.id, agent.id, sandbox
        );
        Ok(session)
    }

    /// Execute input inside a session's sandbox.
    ///
    /// When `include_context` is set, the prior conversation log is replayed
    /// into the effective prompt. The turn pair is appended and the activity
    /// marker updated only when the sandbox succeeds; a failed command
    /// leaves the conversation log untouched.
    pub async fn execute_in_session(
        &self,
        session_id: &str,
        input: &str,
        include_context: bool,
    ) -> SessionResult<ExecutionResult> {
        let lock = self.lock_for(session_id);
        let _guard = lock.lock().await;

        let session = self
            .repo
            .get(session_id)
            .await?
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;

        match session.status {
            SessionStatus::Stopped => {
                return Err(SessionError::InvalidState(format!(
                    "session {} is stopped",
                    session_id
                )));
            }
            SessionStatus::Hibernated => {
                return Err(SessionError::InvalidState(format!(
                    "session {} is hibernated; resume it before executing",
                    session_id
                )));
            }
            SessionStatus::Active | SessionStatus::Idle => {}
        }

        let sandbox_ref = session
            .sandbox_ref
            .clone()
            .map(SandboxRef)
            .ok_or_else(|| {
                SessionError::Storage(anyhow!(
                    "session {} is {} but has no sandbox ref",
                    session_id,
                    session.status
                ))
            })?;

        let prompt = if include_context {
            let turns = self.repo.list_turns(session_id).await?;
            build_prompt(&turns, input)
        } else {
            input.to_string()
        };

        let started = Instant::now();
        let output = self
            .executor
            .run_command(&sandbox_ref, &prompt)
            .await
            .map_err(|e| SessionError::Execution(e.to_string()))?;
        let duration_ms = started.elapsed().as_millis() as i64;

        // Context reflects only successful turns.
        self.repo
            .append_turn_pair(session_id, input, &output.output)
            .await?;
        self.repo.touch_activity(session_id).await?;

        debug!(
            "Executed in session {} ({} ms, context={})",
            session_id, duration_ms, include_context
        );

        Ok(ExecutionResult {
            session_id: session_id.to_string(),
            output: output.output,
            duration_ms,
        })
    }

    /// Hibernate a live session: tear down the sandbox, keep the session
    /// row and conversation log.
    pub async fn hibernate_session(&self, session_id: &str) -> SessionResult<Session> {
        let lock = self.lock_for(session_id);
        let _guard = lock.lock().await;

        let session = self
            .repo
            .get(session_id)
            .await?
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;

        match session.status {
            SessionStatus::Hibernated => {
                return Err(SessionError::InvalidState(format!(
                    "session {} is already hibernated",
                    session_id
                )));
            }
            SessionStatus::Stopped => {
                return Err(SessionError::InvalidState(format!(
                    "session {} is stopped",
                    session_id
                )));
            }
            SessionStatus::Active | SessionStatus::Idle => {}
        }

        self.teardown_sandbox(&session).await;

        if !self.repo.mark_hibernated(session_id).await? {
            return Err(SessionError::InvalidState(format!(
                "session {} changed state concurrently",
                session_id
            )));
        }

        info!("Hibernated session {}", session_id);
        self.get_session(session_id)
            .await?
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))
    }

    /// Resume a hibernated session by provisioning a fresh sandbox. The
    /// conversation log is preserved and will be replayed on the next
    /// context-bearing execution.
    pub async fn resume_session(&self, session_id: &str) -> SessionResult<Session> {
        let lock = self.lock_for(session_id);
        let _guard = lock.lock().await;

        let session = self
            .repo
            .get(session_id)
            .await?
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;

        if session.status != SessionStatus::Hibernated {
            return Err(SessionError::InvalidState(format!(
                "session {} is {}; only hibernated sessions can be resumed",
                session_id, session.status
            )));
        }

        let sandbox = self
            .executor
            .create_sandbox(session_id, &self.sandbox_options())
            .await
            .map_err(SessionError::Provisioning)?;

        if !self.repo.mark_resumed(session_id, sandbox.as_str()).await? {
            // Lost a race; don't leak the sandbox we just provisioned.
            if let Err(e) = self.executor.destroy_sandbox(&sandbox).await {
                warn!("Failed to destroy orphaned sandbox {}: {:?}", sandbox, e);
            }
            return Err(SessionError::InvalidState(format!(
                "session {} changed state concurrently",
                session_id
            )));
        }

        info!("Resumed session {} (sandbox {})", session_id, sandbox);
        self.get_session(session_id)
            .await?
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))
    }

    /// Stop a session. Terminal and idempotent: stopping an already-stopped
    /// session succeeds as a no-op.
    pub async fn stop_session(&self, session_id: &str) -> SessionResult<()> {
        let lock = self.lock_for(session_id);
        {
            let _guard = lock.lock().await;

            let session = self
                .repo
                .get(session_id)
                .await?
                .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;

            if session.is_stopped() {
                debug!("Session {} already stopped", session_id);
                return Ok(());
            }

            self.teardown_sandbox(&session).await;
            self.repo.mark_stopped(session_id).await?;
            info!("Stopped session {}", session_id);
        }

        self.locks.remove(session_id);
        Ok(())
    }

    /// Best-effort sandbox teardown. Failures are logged, not propagated:
    /// the store is the source of truth and the remote service reaps
    /// orphans by its own timeout.
    async fn teardown_sandbox(&self, session: &Session) {
        if let Some(ref sandbox_ref) = session.sandbox_ref {
            let handle = SandboxRef(sandbox_ref.clone());
            if let Err(e) = self.executor.destroy_sandbox(&handle).await {
                warn!(
                    "Failed to destroy sandbox {} for session {}: {:?}",
                    handle, session.id, e
                );
            }
        }
    }

    /// Get a session by ID.
    pub async fn get_session(&self, session_id: &str) -> SessionResult<Option<Session>> {
        Ok(self.repo.get(session_id).await?)
    }

    /// List sessions, optionally filtered by agent.
    pub async fn list_sessions(&self, agent_id: Option<&str>) -> SessionResult<Vec<Session>> {
        Ok(self.repo.list(agent_id).await?)
    }

    /// Conversation log for a session, in append order.
    pub async fn list_turns(&self, session_id: &str) -> SessionResult<Vec<Turn>> {
        if self.repo.get(session_id).await?.is_none() {
            return Err(SessionError::NotFound(session_id.to_string()));
        }
        Ok(self.repo.list_turns(session_id).await?)
    }

    /// Demote active sessions past the idle threshold, then hibernate idle
    /// sessions past the hibernate threshold. Returns (idled, hibernated).
    pub async fn reap_inactive(&self) -> SessionResult<(usize, usize)> {
        let idle_cutoff = cutoff_rfc3339(self.config.idle_after);
        let mut idled = 0;
        for session in self
            .repo
            .list_live_inactive_since(SessionStatus::Active, &idle_cutoff)
            .await?
        {
            if self.repo.mark_idle(&session.id).await? {
                debug!("Session {} idle since {}", session.id, session.last_activity_at);
                idled += 1;
            }
        }

        let hibernate_cutoff = cutoff_rfc3339(self.config.hibernate_after);
        let mut hibernated = 0;
        for session in self
            .repo
            .list_live_inactive_since(SessionStatus::Idle, &hibernate_cutoff)
            .await?
        {
            match self.hibernate_session(&session.id).await {
                Ok(_) => hibernated += 1,
                // Raced with an execution or an explicit transition.
                Err(SessionError::InvalidState(_)) => {}
                Err(e) => return Err(e),
            }
        }

        Ok((idled, hibernated))
    }
}

fn cutoff_rfc3339(age: Duration) -> String {
    // An unrepresentable threshold means nothing is ever stale.
    let age = chrono::Duration::from_std(age).unwrap_or_else(|_| chrono::Duration::days(36500));
    (Utc::now() - age).to_rfc3339()
}

/// Build the effective prompt: serialized prior turns, then the new input.
fn build_prompt(turns: &[Turn], input: &str) -> String {
    if turns.is_empty() {
        return input.to_string();
    }

    let mut prompt = String::new();
    for turn in turns {
        prompt.push_str(&format!("{}: {}\n", turn.role, turn.content));
    }
    prompt.push_str(&format!("user: {}", input));
    prompt
}
