pub mod allowlist;
pub mod auth;
pub mod messages;
pub mod realtime;
pub mod workflows;

use axum::Router;

use switchboard_core::state::AppState;

/// Build the complete API router with all sub-routes.
///
/// Every route here requires a bearer token carrying a tenant claim.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .nest("/api/agents", agent_router())
        .nest("/api/workflows", workflows::router())
        .merge(messages::router())
        .merge(allowlist::graph_router())
        .merge(realtime::router())
}

fn agent_router() -> Router<AppState> {
    Router::new()
        .merge(messages::agent_router())
        .merge(allowlist::router())
}
