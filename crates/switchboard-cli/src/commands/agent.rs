//! `switchboard agent` - Register and list tenant agents.
//!
//! Agents are normally provisioned by the surrounding platform; these
//! commands exist for local setups and demos.

use switchboard_core::models::Agent;
use switchboard_core::state::AppState;

use super::to_json;

pub async fn add(
    state: &AppState,
    tenant_id: &str,
    id: Option<&str>,
    name: &str,
    role: Option<&str>,
) -> Result<serde_json::Value, String> {
    let id = id
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let agent = Agent::new(
        id,
        tenant_id.to_string(),
        name.to_string(),
        role.map(str::to_string),
    );
    state
        .agent_store
        .save(&agent)
        .await
        .map_err(|e| e.to_string())?;
    tracing::info!("[Cli] Registered agent {} in tenant {}", agent.id, tenant_id);
    to_json(&agent)
}

pub async fn list(state: &AppState, tenant_id: &str) -> Result<serde_json::Value, String> {
    let agents = state
        .agent_store
        .list_by_tenant(tenant_id)
        .await
        .map_err(|e| e.to_string())?;
    to_json(&agents)
}
