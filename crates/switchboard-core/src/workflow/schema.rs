//! Typed workflow data model.
//!
//! Templates and instances are persisted as JSON columns but every read goes
//! through these types, so an unknown step type or step status is rejected
//! instead of flowing through the orchestrator.
//!
//! A template in YAML form:
//!
//! ```yaml
//! id: "escalation-chain"
//! name: "escalation-chain"
//! label: "Escalation Chain"
//! steps:
//!   - name: "notify"
//!     type: notification
//!     timeoutMs: 60000
//!   - name: "escalate"
//!     type: task_handoff
//!     agentRole: "supervisor"
//! ```

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ServerError;
use crate::models::message::MessageType;

/// Kind of message a step fans out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Notification,
    DataRequest,
    StatusUpdate,
    TaskHandoff,
}

impl StepType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Notification => "notification",
            Self::DataRequest => "data_request",
            Self::StatusUpdate => "status_update",
            Self::TaskHandoff => "task_handoff",
        }
    }
}

impl From<StepType> for MessageType {
    fn from(step_type: StepType) -> Self {
        match step_type {
            StepType::Notification => MessageType::Notification,
            StepType::DataRequest => MessageType::DataRequest,
            StepType::StatusUpdate => MessageType::StatusUpdate,
            StepType::TaskHandoff => MessageType::TaskHandoff,
        }
    }
}

/// A single step in a workflow template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
    /// Step name (unique within the template)
    pub name: String,

    #[serde(rename = "type")]
    pub step_type: StepType,

    /// Informational: the role the recipients are expected to play
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_role: Option<String>,

    /// How long the step may stay current before it is timed out
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Free-form configuration copied into every message payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
}

impl WorkflowStep {
    pub fn timeout(&self, default: Duration) -> Duration {
        self.timeout_ms.map(Duration::from_millis).unwrap_or(default)
    }
}

/// A declarative multi-step coordination plan.
///
/// `tenant_id = None` marks a shared template visible to every tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowTemplate {
    pub id: String,
    pub name: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub steps: Vec<WorkflowStep>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub is_system: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl WorkflowTemplate {
    pub fn is_visible_to(&self, tenant_id: &str) -> bool {
        match &self.tenant_id {
            None => true,
            Some(owner) => owner == tenant_id,
        }
    }

    /// Structural checks applied before a template is stored.
    ///
    /// An empty step list is accepted here; triggering such a template is
    /// what fails.
    pub fn validate(&self, max_steps: usize) -> Result<(), ServerError> {
        if self.steps.len() > max_steps {
            return Err(ServerError::BadRequest(format!(
                "Template '{}' has {} steps (max {})",
                self.name,
                self.steps.len(),
                max_steps
            )));
        }
        let mut seen = HashSet::new();
        for step in &self.steps {
            if step.name.trim().is_empty() {
                return Err(ServerError::BadRequest(format!(
                    "Template '{}' has a step without a name",
                    self.name
                )));
            }
            if !seen.insert(step.name.as_str()) {
                return Err(ServerError::BadRequest(format!(
                    "Template '{}' has duplicate step name '{}'",
                    self.name, step.name
                )));
            }
            if step.timeout_ms == Some(0) {
                return Err(ServerError::BadRequest(format!(
                    "Step '{}' must have a positive timeoutMs",
                    step.name
                )));
            }
        }
        Ok(())
    }

    /// Parse a template definition from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ServerError> {
        serde_yaml::from_str(yaml)
            .map_err(|e| ServerError::BadRequest(format!("Failed to parse template YAML: {}", e)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Pending,
    Running,
    Completed,
    Failed,
    TimedOut,
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "timed_out" => Some(Self::TimedOut),
            _ => None,
        }
    }

    /// Pending or running: the orchestrator may still act on the instance.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    TimedOut,
}

/// Execution record of one step, stored at index `step` of the instance's
/// step log list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepLog {
    pub step: usize,
    pub name: String,
    pub status: StepStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// First message accepted for this step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub message_ids: Vec<String>,
    /// Recipients dropped because the allowlist denied the send
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_recipients: Vec<String>,
}

impl StepLog {
    pub fn running(step: usize, name: &str) -> Self {
        Self {
            step,
            name: name.to_string(),
            status: StepStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            error: None,
            message_id: None,
            message_ids: Vec::new(),
            skipped_recipients: Vec::new(),
        }
    }

    pub fn finish(&mut self, status: StepStatus, error: Option<String>) {
        self.status = status;
        self.error = error;
        self.completed_at = Some(Utc::now());
    }
}

/// Trigger-time input. `agentIds[0]` is the sender of every step; any other
/// keys are carried into the step payloads untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowInput {
    #[serde(default)]
    pub agent_ids: Vec<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowInstance {
    pub id: String,
    pub template_id: String,
    pub tenant_id: String,
    pub status: InstanceStatus,
    pub current_step: usize,
    pub triggered_by: String,
    pub input_data: WorkflowInput,
    pub step_logs: Vec<StepLog>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl WorkflowInstance {
    pub fn new(
        id: String,
        template_id: String,
        tenant_id: String,
        triggered_by: String,
        input_data: WorkflowInput,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            template_id,
            tenant_id,
            status: InstanceStatus::Pending,
            current_step: 0,
            triggered_by,
            input_data,
            step_logs: Vec::new(),
            created_at: now,
            updated_at: now,
            completed_at: None,
            failed_at: None,
            failure_reason: None,
        }
    }

    /// Insert or overwrite the log of step `log.step`.
    ///
    /// Logs are dense: step `i` can only be recorded once steps `0..i` have
    /// been dispatched.
    pub fn record_step_log(&mut self, log: StepLog) -> Result<(), ServerError> {
        let idx = log.step;
        if idx < self.step_logs.len() {
            self.step_logs[idx] = log;
            Ok(())
        } else if idx == self.step_logs.len() {
            self.step_logs.push(log);
            Ok(())
        } else {
            Err(ServerError::Internal(format!(
                "Instance {} has no log for step {} yet, cannot record step {}",
                self.id,
                self.step_logs.len(),
                idx
            )))
        }
    }

    pub fn step_log_mut(&mut self, step: usize) -> Option<&mut StepLog> {
        self.step_logs.get_mut(step)
    }

    /// Move the instance into a terminal failure state.
    pub fn fail(&mut self, status: InstanceStatus, reason: String) {
        let now = Utc::now();
        self.status = status;
        self.failed_at = Some(now);
        self.failure_reason = Some(reason);
        self.updated_at = now;
    }
}

/// Body of a trigger request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerWorkflowInput {
    pub agent_ids: Vec<String>,
    #[serde(default)]
    pub input_data: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceFilter {
    #[serde(default)]
    pub status: Option<InstanceStatus>,
    #[serde(default)]
    pub template_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(name: &str) -> WorkflowStep {
        WorkflowStep {
            name: name.to_string(),
            step_type: StepType::Notification,
            agent_role: None,
            timeout_ms: None,
            config: None,
        }
    }

    #[test]
    fn test_parse_template_yaml() {
        let yaml = r#"
id: "handoff"
name: "handoff"
label: "Handoff"
steps:
  - name: "announce"
    type: notification
    timeoutMs: 1500
  - name: "handoff"
    type: task_handoff
    agentRole: "reviewer"
    config:
      priority: high
"#;
        let template = WorkflowTemplate::from_yaml(yaml).unwrap();
        assert_eq!(template.steps.len(), 2);
        assert_eq!(template.steps[0].timeout(Duration::from_secs(300)), Duration::from_millis(1500));
        assert_eq!(template.steps[1].step_type, StepType::TaskHandoff);
        assert_eq!(template.steps[1].agent_role.as_deref(), Some("reviewer"));
        assert!(template.tenant_id.is_none());
        assert!(template.is_visible_to("any-tenant"));
    }

    #[test]
    fn test_unknown_step_type_is_rejected() {
        let yaml = r#"
id: "bad"
name: "bad"
label: "Bad"
steps:
  - name: "x"
    type: teleport
"#;
        assert!(WorkflowTemplate::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_validate_limits_and_duplicates() {
        let mut template = WorkflowTemplate {
            id: "t".into(),
            name: "t".into(),
            label: "T".into(),
            description: None,
            steps: (0..21).map(|i| step(&format!("s{}", i))).collect(),
            tenant_id: Some("tenant-a".into()),
            is_system: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(template.validate(20).is_err());

        template.steps = vec![step("a"), step("a")];
        assert!(template.validate(20).is_err());

        template.steps = vec![step("a"), step("b")];
        assert!(template.validate(20).is_ok());
        assert!(template.is_visible_to("tenant-a"));
        assert!(!template.is_visible_to("tenant-b"));
    }

    #[test]
    fn test_step_logs_are_dense() {
        let mut instance = WorkflowInstance::new(
            "i".into(),
            "t".into(),
            "tenant".into(),
            "actor".into(),
            WorkflowInput::default(),
        );
        assert!(instance.record_step_log(StepLog::running(1, "b")).is_err());
        instance.record_step_log(StepLog::running(0, "a")).unwrap();
        instance.record_step_log(StepLog::running(0, "a")).unwrap();
        assert_eq!(instance.step_logs.len(), 1);
        instance.record_step_log(StepLog::running(1, "b")).unwrap();
        assert_eq!(instance.step_logs.len(), 2);
    }

    #[test]
    fn test_workflow_input_keeps_extra_keys() {
        let input: WorkflowInput = serde_json::from_value(serde_json::json!({
            "agentIds": ["a", "b"],
            "ticket": "OPS-12"
        }))
        .unwrap();
        assert_eq!(input.agent_ids, vec!["a", "b"]);
        assert_eq!(input.extra["ticket"], "OPS-12");
    }
}
