//! Test utilities and common setup.

use axum::Router;
use std::sync::Arc;

use coherex::agent::AgentRepository;
use coherex::api;
use coherex::db::Database;
use coherex::execution::ExecutionRepository;
use coherex::sandbox::SimulatedExecutor;
use coherex::session::{SessionRepository, SessionService, SessionServiceConfig};

/// Create a test application with all services wired to an in-memory
/// database and the simulated sandbox executor.
pub async fn test_app() -> Router {
    let (app, _) = test_app_with_executor().await;
    app
}

/// Like [`test_app`], but also hands back the simulated executor so tests
/// can inject failures and assert on sandbox lifecycles.
pub async fn test_app_with_executor() -> (Router, Arc<SimulatedExecutor>) {
    let db = Database::in_memory().await.unwrap();
    let executor = Arc::new(SimulatedExecutor::new());

    let session_service = SessionService::new(
        SessionRepository::new(db.pool().clone()),
        executor.clone(),
        SessionServiceConfig::default(),
    );
    let agent_repo = AgentRepository::new(db.pool().clone());
    let execution_repo = ExecutionRepository::new(db.pool().clone());

    let state = api::AppState::new(session_service, agent_repo, execution_repo, executor.clone());
    (api::create_router(state), executor)
}
