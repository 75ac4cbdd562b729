//! Shared system templates, seeded at startup and visible to every tenant.

use crate::error::ServerError;
use crate::workflow::schema::WorkflowTemplate;

const ESCALATION_CHAIN: &str = r#"
id: "system-escalation-chain"
name: "escalation-chain"
label: "Escalation Chain"
description: "Notify the participants, then hand the issue over for escalation"
isSystem: true
steps:
  - name: "notify"
    type: notification
    timeoutMs: 60000
  - name: "request-context"
    type: data_request
    timeoutMs: 120000
  - name: "escalate"
    type: task_handoff
    agentRole: "supervisor"
    timeoutMs: 300000
"#;

const DATA_COLLECTION: &str = r#"
id: "system-data-collection"
name: "data-collection"
label: "Data Collection"
description: "Ask every participant for data and announce when the round closes"
isSystem: true
steps:
  - name: "request"
    type: data_request
    timeoutMs: 300000
  - name: "close-round"
    type: status_update
    timeoutMs: 60000
"#;

const STATUS_BROADCAST: &str = r#"
id: "system-status-broadcast"
name: "status-broadcast"
label: "Status Broadcast"
description: "Single-step status fan-out from the first agent to the others"
isSystem: true
steps:
  - name: "broadcast"
    type: status_update
    timeoutMs: 60000
"#;

/// Parse the built-in template set.
pub fn builtin_templates() -> Result<Vec<WorkflowTemplate>, ServerError> {
    [ESCALATION_CHAIN, DATA_COLLECTION, STATUS_BROADCAST]
        .iter()
        .map(|yaml| WorkflowTemplate::from_yaml(yaml))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_parse_and_validate() {
        let templates = builtin_templates().unwrap();
        assert_eq!(templates.len(), 3);
        for t in &templates {
            assert!(t.is_system);
            assert!(t.tenant_id.is_none());
            assert!(!t.steps.is_empty());
            t.validate(20).unwrap();
        }
    }
}
