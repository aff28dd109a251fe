//! Execution audit trail: models and persistence.

mod models;
mod repository;

pub use models::{ExecutionOutcome, ExecutionRecord, ExecutionStatus};
pub use repository::ExecutionRepository;
