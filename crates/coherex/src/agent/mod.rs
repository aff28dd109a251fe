//! Agent configuration: models and persistence.
//!
//! Agents are read-only input to the session core; this module only
//! stores and retrieves their configuration.

mod models;
mod repository;

pub use models::{AgentConfig, AgentStatus, CreateAgentRequest, ExecutionMode};
pub use repository::AgentRepository;
