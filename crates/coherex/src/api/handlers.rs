//! API request handlers - the execution router.
//!
//! Boundary logic only: validation, audit-record bookkeeping,
//! resume-on-demand for hibernated sessions, and the scoped-sandbox path
//! for ephemeral agents. All session state transitions live in the
//! session service.

use std::time::Instant;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::agent::{AgentConfig, CreateAgentRequest, ExecutionMode};
use crate::execution::{ExecutionOutcome, ExecutionRecord};
use crate::sandbox::{SandboxError, SandboxOptions};
use crate::session::{
    CreateSessionRequest, ExecuteRequest, Session, SessionError, SessionStatus, Turn,
};

use super::error::{ApiError, ApiResult};
use super::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============================================================================
// Agents
// ============================================================================

/// Register a new agent.
#[instrument(skip(state, request), fields(name = %request.name))]
pub async fn create_agent(
    State(state): State<AppState>,
    Json(request): Json<CreateAgentRequest>,
) -> ApiResult<(StatusCode, Json<AgentConfig>)> {
    let agent = state.agents.create(request).await?;
    info!(agent_id = %agent.id, mode = %agent.execution_mode, "Registered agent");
    Ok((StatusCode::CREATED, Json(agent)))
}

/// Get an agent by ID.
#[instrument(skip(state))]
pub async fn get_agent(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> ApiResult<Json<AgentConfig>> {
    let agent = state
        .agents
        .get(&agent_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Agent {} not found", agent_id)))?;
    Ok(Json(agent))
}

/// List all agents.
#[instrument(skip(state))]
pub async fn list_agents(State(state): State<AppState>) -> ApiResult<Json<Vec<AgentConfig>>> {
    Ok(Json(state.agents.list().await?))
}

// ============================================================================
// Sessions
// ============================================================================

/// Query filter for session listing.
#[derive(Debug, Deserialize)]
pub struct SessionListQuery {
    pub agent_id: Option<String>,
}

/// List sessions, optionally filtered by agent.
#[instrument(skip(state))]
pub async fn list_sessions(
    State(state): State<AppState>,
    Query(query): Query<SessionListQuery>,
) -> ApiResult<Json<Vec<Session>>> {
    let sessions = state.sessions.list_sessions(query.agent_id.as_deref()).await?;
    Ok(Json(sessions))
}

/// Get a specific session by ID.
#[instrument(skip(state))]
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<Session>> {
    state
        .sessions
        .get_session(&session_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Session {} not found", session_id)))
}

/// Create (or reuse) a session for a persistent agent.
#[instrument(skip(state, request), fields(agent_id = %request.agent_id))]
pub async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> ApiResult<(StatusCode, Json<Session>)> {
    let agent = state
        .agents
        .get(&request.agent_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Agent {} not found", request.agent_id)))?;

    let session = state
        .sessions
        .get_or_create_session(&agent, request.force_new)
        .await?;
    info!(session_id = %session.id, "Session ready");
    Ok((StatusCode::OK, Json(session)))
}

/// Lifecycle action on a session.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionAction {
    Hibernate,
    Resume,
    Stop,
}

/// Request body for `PATCH /sessions/{id}`.
#[derive(Debug, Deserialize)]
pub struct SessionActionRequest {
    pub action: SessionAction,
}

/// Apply a lifecycle action (hibernate, resume, stop) to a session.
#[instrument(skip(state, request))]
pub async fn session_action(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<SessionActionRequest>,
) -> ApiResult<Json<Session>> {
    let session = match request.action {
        SessionAction::Hibernate => state.sessions.hibernate_session(&session_id).await?,
        SessionAction::Resume => state.sessions.resume_session(&session_id).await?,
        SessionAction::Stop => {
            state.sessions.stop_session(&session_id).await?;
            state
                .sessions
                .get_session(&session_id)
                .await?
                .ok_or_else(|| ApiError::not_found(format!("Session {} not found", session_id)))?
        }
    };

    Ok(Json(session))
}

/// Stop a session. Idempotent: deleting an already-stopped session succeeds.
#[instrument(skip(state))]
pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<StatusCode> {
    state.sessions.stop_session(&session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Conversation log for a session.
#[instrument(skip(state))]
pub async fn list_session_turns(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<Vec<Turn>>> {
    Ok(Json(state.sessions.list_turns(&session_id).await?))
}

// ============================================================================
// Execution
// ============================================================================

/// Response for both in-session and ephemeral executions.
///
/// Command failures come back as `success: false` with HTTP 200 so a UI can
/// render the degraded result; transport-level errors keep their 4xx/5xx
/// status.
#[derive(Debug, Serialize)]
pub struct ExecuteResponse {
    pub success: bool,
    pub execution_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ExecutionOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Execute input within a persistent session.
///
/// Hibernated sessions are resumed on demand here, before the manager is
/// asked to execute.
#[instrument(skip(state, request))]
pub async fn execute_in_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<ExecuteRequest>,
) -> ApiResult<Json<ExecuteResponse>> {
    let session = state
        .sessions
        .get_session(&session_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Session {} not found", session_id)))?;

    let record = state
        .executions
        .begin(&session.agent_id, Some(&session_id), &request.input)
        .await?;
    state.executions.mark_running(&record.id).await?;

    if session.status == SessionStatus::Hibernated {
        info!(session_id = %session_id, "Resuming hibernated session on demand");
        match state.sessions.resume_session(&session_id).await {
            Ok(_) => {}
            Err(SessionError::Provisioning(source)) => {
                return finish_with_fallback(&state, &record, &request.input, source).await;
            }
            Err(e) => {
                state
                    .executions
                    .mark_failed(&record.id, &e.to_string(), None, &[])
                    .await?;
                return Err(e.into());
            }
        }
    }

    match state
        .sessions
        .execute_in_session(&session_id, &request.input, request.include_context)
        .await
    {
        Ok(result) => {
            state
                .executions
                .mark_completed(&record.id, &result.output, false, result.duration_ms, &[])
                .await?;
            Ok(Json(ExecuteResponse {
                success: true,
                execution_id: record.id,
                session_id: Some(result.session_id),
                duration_ms: Some(result.duration_ms),
                outcome: Some(ExecutionOutcome::Real {
                    output: result.output,
                }),
                error: None,
            }))
        }
        Err(SessionError::Execution(message)) => {
            state
                .executions
                .mark_failed(&record.id, &message, None, &[])
                .await?;
            Ok(Json(ExecuteResponse {
                success: false,
                execution_id: record.id,
                session_id: Some(session_id),
                outcome: None,
                duration_ms: None,
                error: Some(message),
            }))
        }
        Err(e) => {
            state
                .executions
                .mark_failed(&record.id, &e.to_string(), None, &[])
                .await?;
            Err(e.into())
        }
    }
}

/// Request body for agent-level one-shot execution.
#[derive(Debug, Deserialize)]
pub struct ExecuteAgentRequest {
    pub input: String,
}

/// One-shot execution entry point.
///
/// Ephemeral agents get a disposable sandbox that is torn down on every
/// exit path; persistent agents are directed to the session endpoints.
#[instrument(skip(state, request))]
pub async fn execute_agent(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Json(request): Json<ExecuteAgentRequest>,
) -> ApiResult<Json<ExecuteResponse>> {
    let agent = state
        .agents
        .get(&agent_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Agent {} not found", agent_id)))?;

    if !agent.is_executable() {
        return Err(ApiError::bad_request(format!(
            "agent {} is {} and cannot be executed",
            agent.id, agent.status
        )));
    }

    if agent.execution_mode == ExecutionMode::Persistent {
        return Err(ApiError::bad_request(format!(
            "agent {} is persistent; create a session via POST /sessions and execute there",
            agent.id
        )));
    }

    let record = state.executions.begin(&agent.id, None, &request.input).await?;
    state.executions.mark_running(&record.id).await?;

    let disposable_id = format!("ephemeral-{}", Uuid::new_v4());
    let opts = SandboxOptions {
        timeout_seconds: state.sandbox_timeout_seconds,
    };

    let sandbox = match state.sandbox.create_sandbox(&disposable_id, &opts).await {
        Ok(sandbox) => sandbox,
        Err(source) => {
            return finish_with_fallback(&state, &record, &request.input, source).await;
        }
    };

    let started = Instant::now();
    let run = state.sandbox.run_command(&sandbox, &request.input).await;
    let duration_ms = started.elapsed().as_millis() as i64;

    // Teardown on every exit path; failures logged, never propagated.
    if let Err(e) = state.sandbox.destroy_sandbox(&sandbox).await {
        warn!(sandbox = %sandbox, "Failed to destroy ephemeral sandbox: {:?}", e);
    }

    match run {
        Ok(output) => {
            state
                .executions
                .mark_completed(&record.id, &output.output, false, duration_ms, &[])
                .await?;
            Ok(Json(ExecuteResponse {
                success: true,
                execution_id: record.id,
                session_id: None,
                duration_ms: Some(duration_ms),
                outcome: Some(ExecutionOutcome::Real {
                    output: output.output,
                }),
                error: None,
            }))
        }
        Err(e) => {
            let message = e.to_string();
            state
                .executions
                .mark_failed(&record.id, &message, Some(duration_ms), &[])
                .await?;
            Ok(Json(ExecuteResponse {
                success: false,
                execution_id: record.id,
                session_id: None,
                outcome: None,
                duration_ms: Some(duration_ms),
                error: Some(message),
            }))
        }
    }
}

/// Provisioning failed: either fall back to a logged, tagged simulated
/// outcome or fail the audit record and surface the error.
async fn finish_with_fallback(
    state: &AppState,
    record: &ExecutionRecord,
    input: &str,
    source: SandboxError,
) -> ApiResult<Json<ExecuteResponse>> {
    let reason = source.to_string();

    if !state.simulation_fallback {
        state
            .executions
            .mark_failed(&record.id, &reason, None, &[])
            .await?;
        return Err(SessionError::Provisioning(source).into());
    }

    warn!(
        execution_id = %record.id,
        reason = %reason,
        "Sandbox provisioning failed; responding in simulation mode"
    );

    let output = format!("[simulated] {}", input);
    let logs = vec![format!("simulation fallback: {}", reason)];
    state
        .executions
        .mark_completed(&record.id, &output, true, 0, &logs)
        .await?;

    Ok(Json(ExecuteResponse {
        success: true,
        execution_id: record.id.clone(),
        session_id: record.session_id.clone(),
        duration_ms: Some(0),
        outcome: Some(ExecutionOutcome::Simulated { output, reason }),
        error: None,
    }))
}

// ============================================================================
// Execution history
// ============================================================================

/// Audit records for a session, newest first.
#[instrument(skip(state))]
pub async fn list_session_executions(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<Vec<ExecutionRecord>>> {
    if state.sessions.get_session(&session_id).await?.is_none() {
        return Err(ApiError::not_found(format!(
            "Session {} not found",
            session_id
        )));
    }
    Ok(Json(state.executions.list_by_session(&session_id).await?))
}

/// Audit records for an agent, newest first.
#[instrument(skip(state))]
pub async fn list_agent_executions(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> ApiResult<Json<Vec<ExecutionRecord>>> {
    if state.agents.get(&agent_id).await?.is_none() {
        return Err(ApiError::not_found(format!("Agent {} not found", agent_id)));
    }
    Ok(Json(state.executions.list_by_agent(&agent_id).await?))
}
