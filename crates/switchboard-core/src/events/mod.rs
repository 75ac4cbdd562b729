//! Tenant broadcaster - per-tenant publish/subscribe for message events.
//!
//! Every tenant gets one broadcast room, created on first subscribe.
//! Publishing is fire-and-forget: an event for a tenant nobody listens to
//! is dropped, and a room whose last receiver went away is pruned on the
//! next emit.
//!
//! Clients that were disconnected use [`catch_up`] to replay what they
//! missed, bounded to a short lookback window.

pub mod catch_up;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

pub use catch_up::{catch_up, clamp_since};

use crate::models::message::{Message, MessageStatus, MessageType};

/// Server → client event names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageEventType {
    MessageSent,
    MessageDelivered,
    MessageFailed,
}

impl MessageEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MessageSent => "message_sent",
            Self::MessageDelivered => "message_delivered",
            Self::MessageFailed => "message_failed",
        }
    }

    /// Event that best describes a message in its current status.
    pub fn for_status(status: MessageStatus) -> Self {
        match status {
            MessageStatus::Pending => Self::MessageSent,
            MessageStatus::Delivered | MessageStatus::Read => Self::MessageDelivered,
            MessageStatus::Failed => Self::MessageFailed,
        }
    }
}

/// Payload-free view of a message, as carried by realtime events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSummary {
    pub id: String,
    pub sender_id: String,
    pub recipient_id: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub status: MessageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,
}

impl From<&Message> for MessageSummary {
    fn from(m: &Message) -> Self {
        Self {
            id: m.id.clone(),
            sender_id: m.sender_id.clone(),
            recipient_id: m.recipient_id.clone(),
            message_type: m.message_type,
            status: m.status,
            correlation_id: m.correlation_id.clone(),
            created_at: m.created_at,
            delivered_at: m.delivered_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEvent {
    #[serde(rename = "type")]
    pub event_type: MessageEventType,
    pub tenant_id: String,
    pub message: MessageSummary,
    pub timestamp: DateTime<Utc>,
}

impl MessageEvent {
    pub fn new(event_type: MessageEventType, message: &Message) -> Self {
        Self {
            event_type,
            tenant_id: message.tenant_id.clone(),
            message: MessageSummary::from(message),
            timestamp: Utc::now(),
        }
    }
}

const ROOM_CAPACITY: usize = 256;

/// Thread-safe registry of per-tenant broadcast rooms.
#[derive(Clone)]
pub struct TenantBroadcaster {
    rooms: Arc<DashMap<String, broadcast::Sender<MessageEvent>>>,
    capacity: usize,
}

impl Default for TenantBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl TenantBroadcaster {
    pub fn new() -> Self {
        Self::with_capacity(ROOM_CAPACITY)
    }

    /// `capacity` bounds how far a slow subscriber may lag before it
    /// starts missing events.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            capacity,
        }
    }

    /// Join the tenant's room, creating it if needed.
    pub fn subscribe(&self, tenant_id: &str) -> broadcast::Receiver<MessageEvent> {
        self.rooms
            .entry(tenant_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Publish to the tenant's room. Returns how many subscribers received
    /// the event; never fails.
    pub fn emit_message_event(&self, tenant_id: &str, event: MessageEvent) -> usize {
        let event_type = event.event_type;
        let sent = match self.rooms.get(tenant_id) {
            Some(room) => room.send(event).ok(),
            None => None,
        };
        match sent {
            Some(count) => {
                tracing::debug!(
                    "[Broadcast] {} → tenant {} ({} listeners)",
                    event_type.as_str(),
                    tenant_id,
                    count
                );
                count
            }
            None => {
                self.rooms
                    .remove_if(tenant_id, |_, room| room.receiver_count() == 0);
                0
            }
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn listener_count(&self, tenant_id: &str) -> usize {
        self.rooms
            .get(tenant_id)
            .map(|room| room.receiver_count())
            .unwrap_or(0)
    }
}
