//! Messaging service - validated, permissioned sends between agents.
//!
//! A send is accepted once the message row exists in `pending`. Delivery
//! confirmation happens later in [`DeliveryWorker`]; everything after the
//! insert (enqueue, audit, broadcast) is best-effort and cannot fail the
//! call.

pub mod delivery;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

pub use delivery::DeliveryWorker;

use crate::allowlist::AllowlistService;
use crate::audit::{record_best_effort, AuditEvent, AuditSink};
use crate::config::CoreConfig;
use crate::error::ServerError;
use crate::events::{MessageEvent, MessageEventType, TenantBroadcaster};
use crate::models::message::{
    Message, MessageExport, MessageFilter, MessageStats, Page, PageRequest, SendMessageInput,
};
use crate::queue::{DeliveryJob, Job, JobQueue};
use crate::store::{AgentStore, MessageScope, MessageStore};

#[derive(Clone)]
pub struct MessagingService {
    store: MessageStore,
    agent_store: AgentStore,
    allowlist: AllowlistService,
    queue: Arc<dyn JobQueue>,
    broadcaster: TenantBroadcaster,
    audit: Arc<dyn AuditSink>,
    config: CoreConfig,
}

impl MessagingService {
    pub fn new(
        store: MessageStore,
        agent_store: AgentStore,
        allowlist: AllowlistService,
        queue: Arc<dyn JobQueue>,
        broadcaster: TenantBroadcaster,
        audit: Arc<dyn AuditSink>,
        config: CoreConfig,
    ) -> Self {
        Self {
            store,
            agent_store,
            allowlist,
            queue,
            broadcaster,
            audit,
            config,
        }
    }

    /// Send a message from `sender_id` on behalf of `actor_id`.
    ///
    /// Returns the persisted message, always in `pending`.
    pub async fn send_message(
        &self,
        sender_id: &str,
        input: SendMessageInput,
        tenant_id: &str,
        actor_id: &str,
    ) -> Result<Message, ServerError> {
        let sender = self.agent_store.require_in_tenant(sender_id, tenant_id).await?;
        let recipient = self
            .agent_store
            .require_in_tenant(&input.recipient_id, tenant_id)
            .await?;

        if sender.id == recipient.id {
            return Err(ServerError::BadRequest(
                "An agent cannot send a message to itself".to_string(),
            ));
        }

        let payload_bytes = serde_json::to_vec(&input.payload)?.len();
        if payload_bytes > self.config.max_payload_bytes {
            return Err(ServerError::BadRequest(format!(
                "Payload is {} bytes (max {})",
                payload_bytes, self.config.max_payload_bytes
            )));
        }

        if !self.allowlist.can_send_message(&sender.id, &recipient.id).await? {
            tracing::info!(
                "[Messaging] Denied {} -> {} ({})",
                sender.id,
                recipient.id,
                input.message_type.as_str()
            );
            return Err(ServerError::Forbidden(format!(
                "Agent {} is not allowed to message agent {}",
                sender.id, recipient.id
            )));
        }

        let message = Message::new(
            uuid::Uuid::new_v4().to_string(),
            tenant_id.to_string(),
            sender.id,
            recipient.id,
            input.message_type,
            input.payload,
            input.correlation_id,
        );
        self.store.insert(&message).await?;

        let job = Job::DeliverMessage(DeliveryJob {
            message_id: message.id.clone(),
            tenant_id: message.tenant_id.clone(),
            sender_id: message.sender_id.clone(),
            recipient_id: message.recipient_id.clone(),
            message_type: message.message_type,
            correlation_id: message.correlation_id.clone(),
        });
        if let Err(e) = self.queue.enqueue(job, Duration::ZERO) {
            // Stays pending; nothing sweeps it later.
            tracing::error!(
                "[Messaging] Failed to enqueue delivery of {}: {}",
                message.id,
                e
            );
        }

        record_best_effort(
            self.audit.as_ref(),
            AuditEvent::new(
                tenant_id,
                actor_id,
                "message.sent",
                "message",
                &message.id,
                serde_json::json!({
                    "senderId": message.sender_id,
                    "recipientId": message.recipient_id,
                    "type": message.message_type.as_str(),
                    "correlationId": message.correlation_id,
                }),
            ),
        );
        self.broadcaster.emit_message_event(
            tenant_id,
            MessageEvent::new(MessageEventType::MessageSent, &message),
        );

        tracing::info!(
            "[Messaging] Accepted {} {} -> {} ({})",
            message.id,
            message.sender_id,
            message.recipient_id,
            message.message_type.as_str()
        );
        Ok(message)
    }

    /// Messages the agent sent or received, newest first.
    pub async fn get_agent_messages(
        &self,
        agent_id: &str,
        tenant_id: &str,
        filter: MessageFilter,
        page: PageRequest,
    ) -> Result<Page<Message>, ServerError> {
        self.agent_store.require_in_tenant(agent_id, tenant_id).await?;
        self.list_page(
            MessageScope::Agent {
                tenant_id: tenant_id.to_string(),
                agent_id: agent_id.to_string(),
            },
            filter,
            page,
        )
        .await
    }

    pub async fn get_tenant_messages(
        &self,
        tenant_id: &str,
        filter: MessageFilter,
        page: PageRequest,
    ) -> Result<Page<Message>, ServerError> {
        self.list_page(
            MessageScope::Tenant {
                tenant_id: tenant_id.to_string(),
            },
            filter,
            page,
        )
        .await
    }

    async fn list_page(
        &self,
        scope: MessageScope,
        filter: MessageFilter,
        page: PageRequest,
    ) -> Result<Page<Message>, ServerError> {
        let limit = self.config.page_size(page.limit);
        let rows = self
            .store
            .list_page(scope, filter, page.cursor, limit + 1)
            .await?;
        Ok(Page::from_overfetch(rows, limit, |m| m.id.clone()))
    }

    /// Unpaginated read capped at the export ceiling.
    pub async fn export_tenant_messages(
        &self,
        tenant_id: &str,
        filter: MessageFilter,
    ) -> Result<MessageExport, ServerError> {
        let ceiling = self.config.export_row_limit;
        let mut messages = self.store.list_recent(tenant_id, filter, ceiling + 1).await?;
        let truncated = messages.len() > ceiling;
        messages.truncate(ceiling);
        if truncated {
            tracing::warn!(
                "[Messaging] Export for tenant {} truncated at {} rows",
                tenant_id,
                ceiling
            );
        }
        Ok(MessageExport {
            messages,
            truncated,
        })
    }

    pub async fn get_message_stats(&self, tenant_id: &str) -> Result<MessageStats, ServerError> {
        let lookback = chrono::Duration::from_std(self.config.stats_lookback)
            .map_err(|e| ServerError::Internal(format!("Invalid stats lookback: {}", e)))?;
        self.store
            .stats(
                tenant_id,
                self.config.export_row_limit,
                Utc::now() - lookback,
                self.config.latency_sample_size,
            )
            .await
    }
}
