//! Allowlist service - the directed permission graph between agents.
//!
//! Writes go straight to `AllowlistStore` in one transaction; permission
//! checks go through a short-TTL `PermissionCache`. Both allowed and denied
//! decisions are cached, and invalidation after an update is best-effort.

pub mod cache;

use std::sync::Arc;

pub use cache::PermissionCache;

use crate::audit::{record_best_effort, AuditEvent, AuditSink};
use crate::error::ServerError;
use crate::models::allowlist::{
    AllowlistEntry, AllowlistEntryInput, AllowlistUpdate, CommunicationGraph, GraphEdge, GraphNode,
};
use crate::store::{AgentStore, AllowlistStore};

#[derive(Clone)]
pub struct AllowlistService {
    store: AllowlistStore,
    agent_store: AgentStore,
    cache: PermissionCache,
    audit: Arc<dyn AuditSink>,
}

impl AllowlistService {
    pub fn new(
        store: AllowlistStore,
        agent_store: AgentStore,
        cache: PermissionCache,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            store,
            agent_store,
            cache,
            audit,
        }
    }

    pub fn cache(&self) -> &PermissionCache {
        &self.cache
    }

    /// Outbound entries of an agent owned by `tenant_id`.
    pub async fn get_agent_allowlist(
        &self,
        agent_id: &str,
        tenant_id: &str,
    ) -> Result<Vec<AllowlistEntry>, ServerError> {
        self.agent_store.require_in_tenant(agent_id, tenant_id).await?;
        self.store.list_for_agent(agent_id).await
    }

    /// Full replace of an agent's outbound entries.
    pub async fn update_allowlist(
        &self,
        agent_id: &str,
        entries: Vec<AllowlistEntryInput>,
        tenant_id: &str,
        actor_id: &str,
    ) -> Result<AllowlistUpdate, ServerError> {
        self.agent_store.require_in_tenant(agent_id, tenant_id).await?;

        if entries.iter().any(|e| e.allowed_agent_id == agent_id) {
            return Err(ServerError::BadRequest(format!(
                "Agent {} cannot allowlist itself",
                agent_id
            )));
        }

        let counterpart_ids: Vec<String> =
            entries.iter().map(|e| e.allowed_agent_id.clone()).collect();
        let invalid = self
            .agent_store
            .missing_in_tenant(&counterpart_ids, tenant_id)
            .await?;
        if !invalid.is_empty() {
            return Err(ServerError::NotFound(format!(
                "Agents not found: {}",
                invalid.join(", ")
            )));
        }

        let stored = self.store.replace_for_agent(agent_id, entries).await?;

        tracing::info!(
            "[Allowlist] Replaced allowlist of agent {} ({} entries)",
            agent_id,
            stored.len()
        );

        record_best_effort(
            self.audit.as_ref(),
            AuditEvent::new(
                tenant_id,
                actor_id,
                "allowlist.updated",
                "agent",
                agent_id,
                serde_json::json!({
                    "entryCount": stored.len(),
                    "allowedAgentIds": counterpart_ids,
                }),
            ),
        );

        self.cache.invalidate_agent(agent_id);
        for counterpart in &counterpart_ids {
            self.cache.invalidate_agent(counterpart);
        }

        Ok(AllowlistUpdate {
            agent_id: agent_id.to_string(),
            entry_count: stored.len(),
            entries: stored,
        })
    }

    /// Whether `sender_id` may message `recipient_id`.
    ///
    /// Granted iff the sender has an outbound-capable entry for the recipient
    /// or the recipient has an inbound-capable entry for the sender.
    pub async fn can_send_message(
        &self,
        sender_id: &str,
        recipient_id: &str,
    ) -> Result<bool, ServerError> {
        if let Some(allowed) = self.cache.get(sender_id, recipient_id).await {
            return Ok(allowed);
        }

        let forward = self.store.direction(sender_id, recipient_id).await?;
        let allowed = match forward {
            Some(d) if d.permits_outbound() => true,
            _ => self
                .store
                .direction(recipient_id, sender_id)
                .await?
                .map(|d| d.permits_inbound())
                .unwrap_or(false),
        };

        tracing::debug!(
            "[Allowlist] {} -> {}: {}",
            sender_id,
            recipient_id,
            if allowed { "granted" } else { "denied" }
        );
        self.cache.put(sender_id, recipient_id, allowed).await;
        Ok(allowed)
    }

    /// Every agent of the tenant as a node, every allowlist entry among them
    /// as a directed edge.
    pub async fn get_communication_graph(
        &self,
        tenant_id: &str,
    ) -> Result<CommunicationGraph, ServerError> {
        let agents = self.agent_store.list_by_tenant(tenant_id).await?;
        let entries = self.store.list_for_tenant(tenant_id).await?;

        let nodes = agents
            .into_iter()
            .map(|a| GraphNode {
                id: a.id,
                name: a.name,
                role: a.role,
                status: a.status.as_str().to_string(),
            })
            .collect();
        let edges = entries
            .into_iter()
            .map(|e| GraphEdge {
                source: e.agent_id,
                target: e.allowed_agent_id,
                direction: e.direction,
            })
            .collect();

        Ok(CommunicationGraph { nodes, edges })
    }
}
