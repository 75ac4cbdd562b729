//! Audit side channel.
//!
//! Persisting audit records is someone else's job; the core only hands
//! events to an `AuditSink`. Recording is best-effort: a failing sink is
//! logged and never fails the operation that produced the event.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::ServerError;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub tenant_id: String,
    pub actor_id: String,
    /// Dotted action name, e.g. `message.sent`
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        tenant_id: &str,
        actor_id: &str,
        action: &str,
        resource_type: &str,
        resource_id: &str,
        details: serde_json::Value,
    ) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            actor_id: actor_id.to_string(),
            action: action.to_string(),
            resource_type: resource_type.to_string(),
            resource_id: resource_id.to_string(),
            details,
            timestamp: Utc::now(),
        }
    }
}

pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent) -> Result<(), ServerError>;
}

/// Hand an event to the sink, logging instead of propagating failures.
pub fn record_best_effort(sink: &dyn AuditSink, event: AuditEvent) {
    let action = event.action.clone();
    let resource_id = event.resource_id.clone();
    if let Err(e) = sink.record(event) {
        tracing::warn!(
            "[Audit] Failed to record '{}' for {}: {}",
            action,
            resource_id,
            e
        );
    }
}

/// Default sink: one structured log line per event on the `audit` target.
#[derive(Debug, Default, Clone)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) -> Result<(), ServerError> {
        let details = serde_json::to_string(&event.details)?;
        tracing::info!(
            target: "audit",
            tenant_id = %event.tenant_id,
            actor_id = %event.actor_id,
            action = %event.action,
            resource_type = %event.resource_type,
            resource_id = %event.resource_id,
            details = %details,
            "audit event"
        );
        Ok(())
    }
}

/// Keeps events in memory. Useful for tests and local inspection.
#[derive(Debug, Default, Clone)]
pub struct MemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn actions(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.action).collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuditEvent) -> Result<(), ServerError> {
        self.events
            .lock()
            .map_err(|e| ServerError::Internal(format!("Audit buffer poisoned: {}", e)))?
            .push(event);
        Ok(())
    }
}
