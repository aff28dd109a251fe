//! Session lifecycle: models, persistence, and the session manager.

mod error;
mod models;
mod repository;
mod service;

pub use error::{SessionError, SessionResult};
pub use models::{
    CreateSessionRequest, ExecuteRequest, ExecutionResult, Session, SessionStatus, Turn, TurnRole,
};
pub use repository::SessionRepository;
pub use service::{SessionService, SessionServiceConfig};
