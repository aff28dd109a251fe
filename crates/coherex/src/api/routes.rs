//! API route definitions.

use axum::http::{Method, header};
use axum::{
    Router,
    routing::{delete, get, patch, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use super::handlers;
use super::state::AppState;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT]);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    Router::new()
        .route("/health", get(handlers::health))
        // Agent registry
        .route("/agents", get(handlers::list_agents))
        .route("/agents", post(handlers::create_agent))
        .route("/agents/{agent_id}", get(handlers::get_agent))
        .route("/agents/{agent_id}/execute", post(handlers::execute_agent))
        .route(
            "/agents/{agent_id}/executions",
            get(handlers::list_agent_executions),
        )
        // Session lifecycle
        .route("/sessions", get(handlers::list_sessions))
        .route("/sessions", post(handlers::create_session))
        .route("/sessions/{session_id}", get(handlers::get_session))
        .route("/sessions/{session_id}", post(handlers::execute_in_session))
        .route("/sessions/{session_id}", patch(handlers::session_action))
        .route("/sessions/{session_id}", delete(handlers::delete_session))
        .route(
            "/sessions/{session_id}/turns",
            get(handlers::list_session_turns),
        )
        .route(
            "/sessions/{session_id}/executions",
            get(handlers::list_session_executions),
        )
        .layer(cors)
        .layer(trace_layer)
        .with_state(state)
}
