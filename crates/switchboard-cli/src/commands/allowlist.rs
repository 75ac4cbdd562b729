//! `switchboard allowlist` / `switchboard graph` - Inspect and replace
//! communication permissions.

use switchboard_core::models::{AllowlistDirection, AllowlistEntryInput};
use switchboard_core::state::AppState;

use super::to_json;

/// Parse `agent-id` or `agent-id:direction`; the direction defaults to `both`.
pub fn parse_entry(spec: &str) -> Result<AllowlistEntryInput, String> {
    let (id, direction) = match spec.split_once(':') {
        Some((id, raw)) => {
            let direction = AllowlistDirection::from_str(raw).ok_or_else(|| {
                format!(
                    "Unknown direction '{}' (expected both, send_only or receive_only)",
                    raw
                )
            })?;
            (id, direction)
        }
        None => (spec, AllowlistDirection::Both),
    };
    if id.is_empty() {
        return Err(format!("Missing agent id in '{}'", spec));
    }
    Ok(AllowlistEntryInput {
        allowed_agent_id: id.to_string(),
        direction,
    })
}

pub async fn show(
    state: &AppState,
    tenant_id: &str,
    agent_id: &str,
) -> Result<serde_json::Value, String> {
    let entries = state
        .allowlist
        .get_agent_allowlist(agent_id, tenant_id)
        .await
        .map_err(|e| e.to_string())?;
    to_json(&entries)
}

/// Full replace; an empty `specs` clears the allowlist.
pub async fn set(
    state: &AppState,
    tenant_id: &str,
    agent_id: &str,
    specs: &[String],
    actor_id: &str,
) -> Result<serde_json::Value, String> {
    let entries = specs
        .iter()
        .map(|s| parse_entry(s))
        .collect::<Result<Vec<_>, _>>()?;
    let update = state
        .allowlist
        .update_allowlist(agent_id, entries, tenant_id, actor_id)
        .await
        .map_err(|e| e.to_string())?;
    to_json(&update)
}

pub async fn graph(state: &AppState, tenant_id: &str) -> Result<serde_json::Value, String> {
    let graph = state
        .allowlist
        .get_communication_graph(tenant_id)
        .await
        .map_err(|e| e.to_string())?;
    to_json(&graph)
}
