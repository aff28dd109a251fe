//! API integration tests.

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use serde_json::{Value, json};
use tower::ServiceExt;

mod common;
use common::{test_app, test_app_with_executor};

async fn request(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().uri(uri).method(method);
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(serde_json::to_string(&value).unwrap())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();

    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };

    (status, json)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    request(app, Method::GET, uri, None).await
}

async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    request(app, Method::POST, uri, Some(body)).await
}

async fn patch(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    request(app, Method::PATCH, uri, Some(body)).await
}

async fn delete(app: &Router, uri: &str) -> (StatusCode, Value) {
    request(app, Method::DELETE, uri, None).await
}

/// Register an agent and return its ID.
async fn create_agent(app: &Router, name: &str, mode: &str) -> String {
    let (status, body) = post(
        app,
        "/agents",
        json!({
            "name": name,
            "execution_mode": mode,
            "model": "claude-sonnet"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().unwrap().to_string()
}

/// Create a session for the given agent and return its ID.
async fn create_session(app: &Router, agent_id: &str) -> String {
    let (status, body) = post(app, "/sessions", json!({ "agent_id": agent_id })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "active");
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = test_app().await;

    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_agent_registration_roundtrip() {
    let app = test_app().await;

    let agent_id = create_agent(&app, "researcher", "persistent").await;

    let (status, body) = get(&app, &format!("/agents/{}", agent_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "researcher");
    assert_eq!(body["execution_mode"], "persistent");
    assert_eq!(body["status"], "draft");

    let (status, body) = get(&app, "/agents").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_get_unknown_agent_returns_404() {
    let app = test_app().await;

    let (status, body) = get(&app, "/agents/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_create_session_provisions_sandbox() {
    let (app, executor) = test_app_with_executor().await;

    let agent_id = create_agent(&app, "assistant", "persistent").await;
    let (status, body) = post(&app, "/sessions", json!({ "agent_id": agent_id })).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "active");
    assert!(body["sandbox_ref"].is_string());
    assert_eq!(executor.live_count(), 1);
}

#[tokio::test]
async fn test_create_session_reuses_live_session() {
    let app = test_app().await;

    let agent_id = create_agent(&app, "assistant", "persistent").await;
    let first = create_session(&app, &agent_id).await;
    let second = create_session(&app, &agent_id).await;
    assert_eq!(first, second);

    // force_new provisions a distinct session.
    let (status, body) = post(
        &app,
        "/sessions",
        json!({ "agent_id": agent_id, "force_new": true }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(body["id"].as_str().unwrap(), first);
}

#[tokio::test]
async fn test_create_session_for_ephemeral_agent_is_rejected() {
    let app = test_app().await;

    let agent_id = create_agent(&app, "one-shot", "ephemeral").await;
    let (status, body) = post(&app, "/sessions", json!({ "agent_id": agent_id })).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_create_session_for_unknown_agent_returns_404() {
    let app = test_app().await;

    let (status, _) = post(&app, "/sessions", json!({ "agent_id": "ghost" })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_execute_in_session_records_turns() {
    let app = test_app().await;

    let agent_id = create_agent(&app, "assistant", "persistent").await;
    let session_id = create_session(&app, &agent_id).await;

    let (status, body) = post(
        &app,
        &format!("/sessions/{}", session_id),
        json!({ "input": "hi" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["outcome"]["kind"], "real");
    assert_eq!(body["outcome"]["output"], "[simulated] hi");
    assert!(body["execution_id"].is_string());
    assert!(body["duration_ms"].is_i64());

    let (status, turns) = get(&app, &format!("/sessions/{}/turns", session_id)).await;
    assert_eq!(status, StatusCode::OK);
    let turns = turns.as_array().unwrap();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0]["role"], "user");
    assert_eq!(turns[0]["content"], "hi");
    assert_eq!(turns[1]["role"], "assistant");
    assert_eq!(turns[1]["content"], "[simulated] hi");
}

#[tokio::test]
async fn test_execute_replays_conversation_context() {
    let (app, executor) = test_app_with_executor().await;

    let agent_id = create_agent(&app, "assistant", "persistent").await;
    let session_id = create_session(&app, &agent_id).await;

    post(
        &app,
        &format!("/sessions/{}", session_id),
        json!({ "input": "hi" }),
    )
    .await;
    post(
        &app,
        &format!("/sessions/{}", session_id),
        json!({ "input": "how are you" }),
    )
    .await;

    let commands = executor.commands();
    assert_eq!(commands.len(), 2);
    assert_eq!(commands[0].1, "hi");
    let replay = &commands[1].1;
    assert!(replay.starts_with("user: hi\n"), "got: {replay}");
    assert!(replay.contains("assistant: [simulated] hi\n"));
    assert!(replay.ends_with("user: how are you"));
}

#[tokio::test]
async fn test_execute_without_context_sends_raw_input() {
    let (app, executor) = test_app_with_executor().await;

    let agent_id = create_agent(&app, "assistant", "persistent").await;
    let session_id = create_session(&app, &agent_id).await;

    post(
        &app,
        &format!("/sessions/{}", session_id),
        json!({ "input": "hi" }),
    )
    .await;
    post(
        &app,
        &format!("/sessions/{}", session_id),
        json!({ "input": "standalone", "include_context": false }),
    )
    .await;

    let commands = executor.commands();
    assert_eq!(commands[1].1, "standalone");
}

#[tokio::test]
async fn test_failed_command_reports_error_without_recording_turns() {
    let (app, executor) = test_app_with_executor().await;

    let agent_id = create_agent(&app, "assistant", "persistent").await;
    let session_id = create_session(&app, &agent_id).await;

    executor.fail_next_command();
    let (status, body) = post(
        &app,
        &format!("/sessions/{}", session_id),
        json!({ "input": "boom" }),
    )
    .await;

    // Command failures are a structured 200, not a transport error.
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("command failed"));
    assert!(body["outcome"].is_null());

    let (_, turns) = get(&app, &format!("/sessions/{}/turns", session_id)).await;
    assert_eq!(turns.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_hibernate_releases_sandbox_and_keeps_context() {
    let (app, executor) = test_app_with_executor().await;

    let agent_id = create_agent(&app, "assistant", "persistent").await;
    let session_id = create_session(&app, &agent_id).await;
    post(
        &app,
        &format!("/sessions/{}", session_id),
        json!({ "input": "hi" }),
    )
    .await;

    let (status, body) = patch(
        &app,
        &format!("/sessions/{}", session_id),
        json!({ "action": "hibernate" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "hibernated");
    assert!(body["sandbox_ref"].is_null());
    assert_eq!(executor.live_count(), 0);

    // Conversation log survives hibernation.
    let (_, turns) = get(&app, &format!("/sessions/{}/turns", session_id)).await;
    assert_eq!(turns.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_hibernate_twice_is_rejected() {
    let app = test_app().await;

    let agent_id = create_agent(&app, "assistant", "persistent").await;
    let session_id = create_session(&app, &agent_id).await;

    patch(
        &app,
        &format!("/sessions/{}", session_id),
        json!({ "action": "hibernate" }),
    )
    .await;
    let (status, _) = patch(
        &app,
        &format!("/sessions/{}", session_id),
        json!({ "action": "hibernate" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_resume_requires_hibernated_state() {
    let app = test_app().await;

    let agent_id = create_agent(&app, "assistant", "persistent").await;
    let session_id = create_session(&app, &agent_id).await;

    let (status, _) = patch(
        &app,
        &format!("/sessions/{}", session_id),
        json!({ "action": "resume" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_execute_resumes_hibernated_session_on_demand() {
    let (app, executor) = test_app_with_executor().await;

    let agent_id = create_agent(&app, "assistant", "persistent").await;
    let session_id = create_session(&app, &agent_id).await;
    post(
        &app,
        &format!("/sessions/{}", session_id),
        json!({ "input": "hi" }),
    )
    .await;
    patch(
        &app,
        &format!("/sessions/{}", session_id),
        json!({ "action": "hibernate" }),
    )
    .await;

    let (status, body) = post(
        &app,
        &format!("/sessions/{}", session_id),
        json!({ "input": "back again" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["outcome"]["kind"], "real");

    let (_, session) = get(&app, &format!("/sessions/{}", session_id)).await;
    assert_eq!(session["status"], "active");
    assert!(session["sandbox_ref"].is_string());
    assert_eq!(executor.live_count(), 1);

    // Context from before hibernation was replayed into the resumed sandbox.
    let commands = executor.commands();
    let replay = &commands.last().unwrap().1;
    assert!(replay.starts_with("user: hi\n"), "got: {replay}");
}

#[tokio::test]
async fn test_stop_session_is_terminal_and_idempotent() {
    let (app, executor) = test_app_with_executor().await;

    let agent_id = create_agent(&app, "assistant", "persistent").await;
    let session_id = create_session(&app, &agent_id).await;

    let (status, _) = delete(&app, &format!("/sessions/{}", session_id)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(executor.live_count(), 0);

    // Stopping again succeeds as a no-op.
    let (status, _) = delete(&app, &format!("/sessions/{}", session_id)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, session) = get(&app, &format!("/sessions/{}", session_id)).await;
    assert_eq!(session["status"], "stopped");
    assert!(session["sandbox_ref"].is_null());

    // No execution from a stopped session, not even via resume-on-demand.
    let (status, _) = post(
        &app,
        &format!("/sessions/{}", session_id),
        json!({ "input": "hi" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_stopped_session_is_not_reused() {
    let app = test_app().await;

    let agent_id = create_agent(&app, "assistant", "persistent").await;
    let first = create_session(&app, &agent_id).await;
    delete(&app, &format!("/sessions/{}", first)).await;

    let second = create_session(&app, &agent_id).await;
    assert_ne!(first, second);
}

#[tokio::test]
async fn test_list_sessions_filters_by_agent() {
    let app = test_app().await;

    let first_agent = create_agent(&app, "a", "persistent").await;
    let second_agent = create_agent(&app, "b", "persistent").await;
    create_session(&app, &first_agent).await;
    create_session(&app, &second_agent).await;

    let (status, body) = get(&app, "/sessions").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (status, body) = get(&app, &format!("/sessions?agent_id={}", first_agent)).await;
    assert_eq!(status, StatusCode::OK);
    let sessions = body.as_array().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0]["agent_id"].as_str().unwrap(), first_agent);
}

#[tokio::test]
async fn test_ephemeral_execute_tears_down_sandbox() {
    let (app, executor) = test_app_with_executor().await;

    let agent_id = create_agent(&app, "one-shot", "ephemeral").await;
    let (status, body) = post(
        &app,
        &format!("/agents/{}/execute", agent_id),
        json!({ "input": "summarize this" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["outcome"]["kind"], "real");
    assert_eq!(body["outcome"]["output"], "[simulated] summarize this");
    assert!(body["session_id"].is_null());

    // The disposable sandbox never outlives the request.
    assert_eq!(executor.live_count(), 0);
    assert_eq!(executor.commands().len(), 1);
}

#[tokio::test]
async fn test_ephemeral_execute_destroys_sandbox_on_command_failure() {
    let (app, executor) = test_app_with_executor().await;

    let agent_id = create_agent(&app, "one-shot", "ephemeral").await;
    executor.fail_next_command();

    let (status, body) = post(
        &app,
        &format!("/agents/{}/execute", agent_id),
        json!({ "input": "boom" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert!(body["error"].is_string());
    assert_eq!(executor.live_count(), 0);
}

#[tokio::test]
async fn test_persistent_agent_is_directed_to_sessions() {
    let app = test_app().await;

    let agent_id = create_agent(&app, "assistant", "persistent").await;
    let (status, body) = post(
        &app,
        &format!("/agents/{}/execute", agent_id),
        json!({ "input": "hi" }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("persistent"));
}

#[tokio::test]
async fn test_provisioning_failure_falls_back_to_simulation() {
    let (app, executor) = test_app_with_executor().await;

    let agent_id = create_agent(&app, "one-shot", "ephemeral").await;
    executor.fail_next_create();

    let (status, body) = post(
        &app,
        &format!("/agents/{}/execute", agent_id),
        json!({ "input": "hello" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["outcome"]["kind"], "simulated");
    assert_eq!(body["outcome"]["output"], "[simulated] hello");
    assert!(body["outcome"]["reason"].is_string());
}

#[tokio::test]
async fn test_resume_on_demand_falls_back_to_simulation() {
    let (app, executor) = test_app_with_executor().await;

    let agent_id = create_agent(&app, "assistant", "persistent").await;
    let session_id = create_session(&app, &agent_id).await;
    patch(
        &app,
        &format!("/sessions/{}", session_id),
        json!({ "action": "hibernate" }),
    )
    .await;

    executor.fail_next_create();
    let (status, body) = post(
        &app,
        &format!("/sessions/{}", session_id),
        json!({ "input": "wake up" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["outcome"]["kind"], "simulated");

    // The session itself stays hibernated; only this response was simulated.
    let (_, session) = get(&app, &format!("/sessions/{}", session_id)).await;
    assert_eq!(session["status"], "hibernated");
}

#[tokio::test]
async fn test_execution_history_endpoints() {
    let app = test_app().await;

    let agent_id = create_agent(&app, "assistant", "persistent").await;
    let session_id = create_session(&app, &agent_id).await;
    post(
        &app,
        &format!("/sessions/{}", session_id),
        json!({ "input": "hi" }),
    )
    .await;

    let (status, body) = get(&app, &format!("/sessions/{}/executions", session_id)).await;
    assert_eq!(status, StatusCode::OK);
    let records = body.as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["status"], "completed");
    assert_eq!(records[0]["simulated"], false);
    assert_eq!(records[0]["input"], "hi");
    assert!(records[0]["completed_at"].is_string());

    let (status, body) = get(&app, &format!("/agents/{}/executions", agent_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, _) = get(&app, "/sessions/ghost/executions").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = get(&app, "/agents/ghost/executions").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_failed_execution_is_audited() {
    let (app, executor) = test_app_with_executor().await;

    let agent_id = create_agent(&app, "assistant", "persistent").await;
    let session_id = create_session(&app, &agent_id).await;

    executor.fail_next_command();
    post(
        &app,
        &format!("/sessions/{}", session_id),
        json!({ "input": "boom" }),
    )
    .await;

    let (_, body) = get(&app, &format!("/sessions/{}/executions", session_id)).await;
    let records = body.as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["status"], "failed");
    assert!(records[0]["completed_at"].is_string());
}
