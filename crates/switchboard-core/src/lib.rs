//! Switchboard Core - transport-agnostic inter-agent messaging.
//!
//! This crate contains the permission graph between agents, the durable
//! message log, the delivery job pipeline, per-tenant broadcast and the
//! workflow orchestrator built on top of them. It has **no HTTP framework
//! dependency** by default, making it suitable for use in:
//!
//! - HTTP servers (via `switchboard-server`)
//! - CLI tools
//! - Embedding in other services with their own job queue
//!
//! # Feature Flags
//!
//! - `axum` - Enables `IntoResponse` impl on `ServerError` for use in axum handlers.

pub mod allowlist;
pub mod audit;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod messaging;
pub mod models;
pub mod queue;
pub mod state;
pub mod store;
pub mod workflow;

// Convenience re-exports
pub use config::CoreConfig;
pub use db::Database;
pub use error::ServerError;
pub use state::{AppState, AppStateInner, JobRunner};
