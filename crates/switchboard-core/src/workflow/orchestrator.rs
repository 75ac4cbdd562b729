//! Workflow orchestrator - drives instances through their template steps.
//!
//! ```text
//! trigger ──► pending ──► ExecuteStep(0) ──► running ──► ExecuteStep(1) ... ──► completed
//!                              │                  │
//!                              └──► failed        └──► TimeoutStep(i) ──► timed_out
//! ```
//!
//! Every transition is a compare-and-set on `(status, current_step)`, so a
//! duplicate, late or stale job observes the newer state and does nothing.
//! A step counts as completed once all permitted sends were accepted, not
//! once they were delivered.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;

use crate::allowlist::AllowlistService;
use crate::audit::{record_best_effort, AuditEvent, AuditSink};
use crate::config::CoreConfig;
use crate::error::ServerError;
use crate::messaging::MessagingService;
use crate::models::message::{Page, PageRequest, SendMessageInput};
use crate::queue::{Job, JobQueue};
use crate::store::{AgentStore, WorkflowStore};
use crate::workflow::builtin::builtin_templates;
use crate::workflow::schema::{
    InstanceFilter, InstanceStatus, StepLog, StepStatus, TriggerWorkflowInput, WorkflowInput,
    WorkflowInstance, WorkflowStep, WorkflowTemplate,
};

/// Result of fanning one step out to its recipients.
#[derive(Debug, Default)]
struct FanOut {
    message_ids: Vec<String>,
    skipped: Vec<String>,
}

#[derive(Clone)]
pub struct WorkflowOrchestrator {
    store: WorkflowStore,
    agent_store: AgentStore,
    allowlist: AllowlistService,
    messaging: MessagingService,
    queue: Arc<dyn JobQueue>,
    audit: Arc<dyn AuditSink>,
    config: CoreConfig,
}

impl WorkflowOrchestrator {
    pub fn new(
        store: WorkflowStore,
        agent_store: AgentStore,
        allowlist: AllowlistService,
        messaging: MessagingService,
        queue: Arc<dyn JobQueue>,
        audit: Arc<dyn AuditSink>,
        config: CoreConfig,
    ) -> Self {
        Self {
            store,
            agent_store,
            allowlist,
            messaging,
            queue,
            audit,
            config,
        }
    }

    /// Upsert the shared system templates. Safe to call on every start.
    pub async fn install_builtin_templates(&self) -> Result<usize, ServerError> {
        let templates = builtin_templates()?;
        for template in &templates {
            template.validate(self.config.max_template_steps)?;
            self.store.save_template(template).await?;
        }
        tracing::info!(
            "[Orchestrator] Installed {} built-in templates",
            templates.len()
        );
        Ok(templates.len())
    }

    /// Store a tenant-owned template.
    pub async fn create_template(
        &self,
        mut template: WorkflowTemplate,
        tenant_id: &str,
    ) -> Result<WorkflowTemplate, ServerError> {
        if template.steps.is_empty() {
            return Err(ServerError::BadRequest(format!(
                "Template '{}' has no steps",
                template.name
            )));
        }
        template.validate(self.config.max_template_steps)?;

        if let Some(existing) = self.store.get_template(&template.id).await? {
            if existing.tenant_id.as_deref() != Some(tenant_id) {
                return Err(ServerError::Conflict(format!(
                    "Template id {} is already taken",
                    template.id
                )));
            }
        }

        let now = Utc::now();
        template.tenant_id = Some(tenant_id.to_string());
        template.is_system = false;
        template.updated_at = now;
        self.store.save_template(&template).await?;
        Ok(template)
    }

    pub async fn list_templates(
        &self,
        tenant_id: &str,
    ) -> Result<Vec<WorkflowTemplate>, ServerError> {
        self.store.list_templates_visible(tenant_id).await
    }

    pub async fn get_instance(
        &self,
        instance_id: &str,
        tenant_id: &str,
    ) -> Result<WorkflowInstance, ServerError> {
        self.store
            .get_instance_in_tenant(instance_id, tenant_id)
            .await?
            .ok_or_else(|| {
                ServerError::NotFound(format!("Workflow instance {} not found", instance_id))
            })
    }

    pub async fn list_instances(
        &self,
        tenant_id: &str,
        filter: InstanceFilter,
        page: PageRequest,
    ) -> Result<Page<WorkflowInstance>, ServerError> {
        let limit = self.config.page_size(page.limit);
        let rows = self
            .store
            .list_instances(tenant_id, filter, page.cursor, limit + 1)
            .await?;
        Ok(Page::from_overfetch(rows, limit, |i| i.id.clone()))
    }

    /// Create a pending instance of `template_id` and schedule its first step.
    pub async fn trigger_workflow(
        &self,
        template_id: &str,
        input: TriggerWorkflowInput,
        tenant_id: &str,
        actor_id: &str,
    ) -> Result<WorkflowInstance, ServerError> {
        let template = self
            .store
            .get_template(template_id)
            .await?
            .filter(|t| t.is_visible_to(tenant_id))
            .ok_or_else(|| {
                ServerError::NotFound(format!("Workflow template {} not found", template_id))
            })?;

        if template.steps.is_empty() {
            return Err(ServerError::BadRequest(format!(
                "Workflow template {} has no steps",
                template_id
            )));
        }
        if input.agent_ids.is_empty() {
            return Err(ServerError::BadRequest(
                "agentIds must contain at least one agent".to_string(),
            ));
        }
        let outside = self
            .agent_store
            .missing_in_tenant(&input.agent_ids, tenant_id)
            .await?;
        if !outside.is_empty() {
            return Err(ServerError::BadRequest(format!(
                "Agents do not belong to this tenant: {}",
                outside.join(", ")
            )));
        }

        let mut extra = input.input_data.unwrap_or_default();
        extra.remove("agentIds");
        let instance = WorkflowInstance::new(
            uuid::Uuid::new_v4().to_string(),
            template.id.clone(),
            tenant_id.to_string(),
            actor_id.to_string(),
            WorkflowInput {
                agent_ids: input.agent_ids,
                extra,
            },
        );
        self.store.create_instance(&instance).await?;

        record_best_effort(
            self.audit.as_ref(),
            AuditEvent::new(
                tenant_id,
                actor_id,
                "workflow.triggered",
                "workflow_instance",
                &instance.id,
                json!({
                    "templateId": template.id,
                    "agentIds": instance.input_data.agent_ids,
                }),
            ),
        );

        let first = Job::ExecuteStep {
            instance_id: instance.id.clone(),
            step_index: 0,
        };
        if let Err(e) = self.queue.enqueue(first, Duration::ZERO) {
            let mut failed = instance.clone();
            failed.fail(
                InstanceStatus::Failed,
                format!("Could not schedule step 0: {}", e),
            );
            self.store
                .update_instance_if(&failed, &[InstanceStatus::Pending], 0)
                .await?;
            return Err(ServerError::Internal(format!(
                "Failed to schedule workflow {}: {}",
                instance.id, e
            )));
        }

        tracing::info!(
            "[Orchestrator] Triggered {} from template {} ({} agents)",
            instance.id,
            template.id,
            instance.input_data.agent_ids.len()
        );
        Ok(instance)
    }

    /// Dispatch step `step_index` of an instance.
    ///
    /// A no-op unless the instance is active and currently on `step_index`.
    /// Failures inside the step are recorded on the instance, not returned.
    /// Once the step is claimed its timeout check is always scheduled, even
    /// when recording the outcome fails.
    pub async fn execute_step(
        &self,
        instance_id: &str,
        step_index: usize,
    ) -> Result<(), ServerError> {
        let Some(mut instance) = self.store.get_instance(instance_id).await? else {
            tracing::warn!("[Orchestrator] Instance {} not found", instance_id);
            return Ok(());
        };
        if !instance.status.is_active() || instance.current_step != step_index {
            tracing::debug!(
                "[Orchestrator] Skipping step {} of {} ({}, current step {})",
                step_index,
                instance.id,
                instance.status.as_str(),
                instance.current_step
            );
            return Ok(());
        }

        let (step, step_count) = match self.resolve_step(&instance, step_index).await {
            Ok(resolved) => resolved,
            Err(e) => {
                instance.fail(InstanceStatus::Failed, e.to_string());
                self.store
                    .update_instance_if(
                        &instance,
                        &[InstanceStatus::Pending, InstanceStatus::Running],
                        step_index,
                    )
                    .await?;
                return Ok(());
            }
        };

        instance.status = InstanceStatus::Running;
        instance.updated_at = Utc::now();
        instance.record_step_log(StepLog::running(step_index, &step.name))?;
        let claimed = self
            .store
            .update_instance_if(
                &instance,
                &[InstanceStatus::Pending, InstanceStatus::Running],
                step_index,
            )
            .await?;
        if !claimed {
            tracing::debug!(
                "[Orchestrator] Step {} of {} was claimed elsewhere",
                step_index,
                instance.id
            );
            return Ok(());
        }

        // From here on the instance is `running` on this step; the timeout
        // check is the only thing that can release it if a write below fails.
        let outcome = match self.fan_out(&instance, &step, step_index).await {
            Ok(fan_out) => {
                self.complete_step(instance, &step, step_index, step_count, fan_out)
                    .await
            }
            Err(e) => self.fail_step(instance, &step, step_index, e).await,
        };
        self.schedule_timeout(instance_id, step_index, &step);
        outcome
    }

    fn schedule_timeout(&self, instance_id: &str, step_index: usize, step: &WorkflowStep) {
        let timeout = Job::TimeoutStep {
            instance_id: instance_id.to_string(),
            step_index,
        };
        if let Err(e) = self
            .queue
            .enqueue(timeout, step.timeout(self.config.default_step_timeout))
        {
            tracing::error!(
                "[Orchestrator] Failed to schedule timeout for step {} of {}: {}",
                step_index,
                instance_id,
                e
            );
        }
    }

    /// Time out step `step_index` if the instance is still running on it.
    pub async fn timeout_step(
        &self,
        instance_id: &str,
        step_index: usize,
    ) -> Result<(), ServerError> {
        let Some(mut instance) = self.store.get_instance(instance_id).await? else {
            return Ok(());
        };
        if instance.status != InstanceStatus::Running || instance.current_step != step_index {
            return Ok(());
        }

        let step_name = instance
            .step_logs
            .get(step_index)
            .map(|log| log.name.clone())
            .unwrap_or_else(|| format!("#{}", step_index));
        let reason = format!("Step {} ({}) timed out", step_index, step_name);

        match instance.step_log_mut(step_index) {
            Some(log) => log.finish(StepStatus::TimedOut, Some(reason.clone())),
            None => {
                let mut log = StepLog::running(step_index, &step_name);
                log.finish(StepStatus::TimedOut, Some(reason.clone()));
                instance.record_step_log(log)?;
            }
        }
        instance.fail(InstanceStatus::TimedOut, reason.clone());

        if self
            .store
            .update_instance_if(&instance, &[InstanceStatus::Running], step_index)
            .await?
        {
            tracing::warn!("[Orchestrator] Instance {}: {}", instance.id, reason);
        }
        Ok(())
    }

    /// The step at `step_index` and the template's step count.
    async fn resolve_step(
        &self,
        instance: &WorkflowInstance,
        step_index: usize,
    ) -> Result<(WorkflowStep, usize), ServerError> {
        let template = self
            .store
            .get_template(&instance.template_id)
            .await?
            .ok_or_else(|| {
                ServerError::NotFound(format!(
                    "Workflow template {} not found",
                    instance.template_id
                ))
            })?;
        let step = template.steps.get(step_index).cloned().ok_or_else(|| {
            ServerError::Internal(format!(
                "Template {} has no step {}",
                template.id, step_index
            ))
        })?;
        Ok((step, template.steps.len()))
    }

    /// Send the step's message from the first agent to every other agent
    /// the allowlist permits.
    async fn fan_out(
        &self,
        instance: &WorkflowInstance,
        step: &WorkflowStep,
        step_index: usize,
    ) -> Result<FanOut, ServerError> {
        let agent_ids = &instance.input_data.agent_ids;
        if agent_ids.len() < 2 {
            return Err(ServerError::BadRequest(format!(
                "Step {} needs at least 2 agents, got {}",
                step_index,
                agent_ids.len()
            )));
        }
        let sender = &agent_ids[0];
        let mut result = FanOut::default();

        for recipient in &agent_ids[1..] {
            if !self.allowlist.can_send_message(sender, recipient).await? {
                tracing::warn!(
                    "[Orchestrator] Instance {} step {}: {} may not message {}, skipping",
                    instance.id,
                    step_index,
                    sender,
                    recipient
                );
                result.skipped.push(recipient.clone());
                continue;
            }

            let payload = json!({
                "workflowInstanceId": instance.id,
                "stepName": step.name,
                "stepIndex": step_index,
                "config": step.config,
                "input": instance.input_data.extra,
            });
            let message = self
                .messaging
                .send_message(
                    sender,
                    SendMessageInput {
                        recipient_id: recipient.clone(),
                        message_type: step.step_type.into(),
                        payload,
                        correlation_id: Some(instance.id.clone()),
                    },
                    &instance.tenant_id,
                    &instance.triggered_by,
                )
                .await?;
            result.message_ids.push(message.id);
        }
        Ok(result)
    }

    async fn complete_step(
        &self,
        mut instance: WorkflowInstance,
        step: &WorkflowStep,
        step_index: usize,
        step_count: usize,
        fan_out: FanOut,
    ) -> Result<(), ServerError> {
        if let Some(log) = instance.step_log_mut(step_index) {
            log.message_id = fan_out.message_ids.first().cloned();
            log.message_ids = fan_out.message_ids;
            log.skipped_recipients = fan_out.skipped;
            log.finish(StepStatus::Completed, None);
        }

        let now = Utc::now();
        let is_last = step_index + 1 >= step_count;
        if is_last {
            instance.status = InstanceStatus::Completed;
            instance.completed_at = Some(now);
        } else {
            instance.current_step = step_index + 1;
        }
        instance.updated_at = now;

        let written = self
            .store
            .update_instance_if(&instance, &[InstanceStatus::Running], step_index)
            .await?;
        if !written {
            tracing::info!(
                "[Orchestrator] Step {} ({}) of {} finished after the instance moved on",
                step_index,
                step.name,
                instance.id
            );
            return Ok(());
        }

        if is_last {
            tracing::info!("[Orchestrator] Instance {} completed", instance.id);
            return Ok(());
        }

        let next = Job::ExecuteStep {
            instance_id: instance.id.clone(),
            step_index: step_index + 1,
        };
        if let Err(e) = self.queue.enqueue(next, self.config.step_advance_delay) {
            tracing::error!(
                "[Orchestrator] Failed to schedule step {} of {}: {}",
                step_index + 1,
                instance.id,
                e
            );
            instance.fail(
                InstanceStatus::Failed,
                format!("Could not schedule step {}: {}", step_index + 1, e),
            );
            self.store
                .update_instance_if(&instance, &[InstanceStatus::Running], step_index + 1)
                .await?;
        }
        Ok(())
    }

    async fn fail_step(
        &self,
        mut instance: WorkflowInstance,
        step: &WorkflowStep,
        step_index: usize,
        error: ServerError,
    ) -> Result<(), ServerError> {
        let reason = error.to_string();
        tracing::warn!(
            "[Orchestrator] Step {} ({}) of {} failed: {}",
            step_index,
            step.name,
            instance.id,
            reason
        );
        if let Some(log) = instance.step_log_mut(step_index) {
            log.finish(StepStatus::Failed, Some(reason.clone()));
        }
        instance.fail(InstanceStatus::Failed, reason);
        self.store
            .update_instance_if(&instance, &[InstanceStatus::Running], step_index)
            .await?;
        Ok(())
    }
}
