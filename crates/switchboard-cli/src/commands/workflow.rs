//! `switchboard templates` - List and register workflow templates.

use switchboard_core::state::AppState;
use switchboard_core::workflow::WorkflowTemplate;

use super::to_json;

pub async fn list(state: &AppState, tenant_id: &str) -> Result<serde_json::Value, String> {
    let templates = state
        .orchestrator
        .list_templates(tenant_id)
        .await
        .map_err(|e| e.to_string())?;
    to_json(&templates)
}

/// Register a tenant-owned template from a YAML file.
pub async fn add(state: &AppState, tenant_id: &str, file: &str) -> Result<serde_json::Value, String> {
    let content = std::fs::read_to_string(file)
        .map_err(|e| format!("Failed to read template file '{}': {}", file, e))?;
    let template = WorkflowTemplate::from_yaml(&content).map_err(|e| e.to_string())?;
    let template = state
        .orchestrator
        .create_template(template, tenant_id)
        .await
        .map_err(|e| e.to_string())?;
    to_json(&template)
}
