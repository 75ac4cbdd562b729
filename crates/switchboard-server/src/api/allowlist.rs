use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};

use switchboard_core::models::allowlist::{
    AllowlistEntry, AllowlistUpdate, CommunicationGraph, UpdateAllowlistInput,
};
use switchboard_core::state::AppState;
use switchboard_core::ServerError;

use super::auth::Tenant;

/// Routes nested under `/api/agents`.
pub fn router() -> Router<AppState> {
    Router::new().route("/{id}/allowlist", get(get_allowlist).put(update_allowlist))
}

pub fn graph_router() -> Router<AppState> {
    Router::new().route("/api/communication-graph", get(communication_graph))
}

async fn get_allowlist(
    State(state): State<AppState>,
    Tenant(ctx): Tenant,
    Path(agent_id): Path<String>,
) -> Result<Json<Vec<AllowlistEntry>>, ServerError> {
    let entries = state
        .allowlist
        .get_agent_allowlist(&agent_id, &ctx.tenant_id)
        .await?;
    Ok(Json(entries))
}

async fn update_allowlist(
    State(state): State<AppState>,
    Tenant(ctx): Tenant,
    Path(agent_id): Path<String>,
    Json(body): Json<UpdateAllowlistInput>,
) -> Result<Json<AllowlistUpdate>, ServerError> {
    let update = state
        .allowlist
        .update_allowlist(&agent_id, body.entries, &ctx.tenant_id, &ctx.actor_id)
        .await?;
    Ok(Json(update))
}

async fn communication_graph(
    State(state): State<AppState>,
    Tenant(ctx): Tenant,
) -> Result<Json<CommunicationGraph>, ServerError> {
    let graph = state.allowlist.get_communication_graph(&ctx.tenant_id).await?;
    Ok(Json(graph))
}
