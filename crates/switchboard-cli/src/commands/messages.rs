//! `switchboard messages` - Read-only views over a tenant's message log.

use switchboard_core::models::MessageFilter;
use switchboard_core::state::AppState;

use super::to_json;

pub async fn stats(state: &AppState, tenant_id: &str) -> Result<serde_json::Value, String> {
    let stats = state
        .messaging
        .get_message_stats(tenant_id)
        .await
        .map_err(|e| e.to_string())?;
    to_json(&stats)
}

pub async fn export(
    state: &AppState,
    tenant_id: &str,
    correlation_id: Option<&str>,
) -> Result<serde_json::Value, String> {
    let filter = MessageFilter {
        correlation_id: correlation_id.map(str::to_string),
        ..MessageFilter::default()
    };
    let export = state
        .messaging
        .export_tenant_messages(tenant_id, filter)
        .await
        .map_err(|e| e.to_string())?;
    to_json(&export)
}
