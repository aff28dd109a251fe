//! Coherex - agent session orchestration service.
//!
//! Library interface exposing the modules shared by the server binary
//! and the integration tests.

pub mod agent;
pub mod api;
pub mod db;
pub mod execution;
pub mod reaper;
pub mod sandbox;
pub mod session;
