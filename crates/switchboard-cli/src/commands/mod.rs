//! CLI command implementations.
//!
//! Each submodule corresponds to a top-level CLI command and reuses
//! the switchboard-core services through `AppState`. Commands return the
//! JSON they would print so tests can inspect it.

pub mod agent;
pub mod allowlist;
pub mod messages;
pub mod server;
pub mod token;
pub mod workflow;

use switchboard_core::state::AppState;
use switchboard_server::ServerConfig;

/// Initialize a shared `AppState` from the given SQLite database path.
///
/// Goes through `switchboard_server::create_app_state` so the CLI and the
/// server agree on queue wiring and built-in templates.
pub async fn init_state(db_path: &str, jwt_secret: &str) -> Result<AppState, String> {
    let config = ServerConfig {
        db_path: db_path.to_string(),
        jwt_secret: jwt_secret.to_string(),
        ..ServerConfig::default()
    };
    switchboard_server::create_app_state(&config).await
}

/// Pretty-print a JSON value to stdout.
pub fn print_json(value: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    );
}

pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, String> {
    serde_json::to_value(value).map_err(|e| format!("Failed to serialize output: {}", e))
}
