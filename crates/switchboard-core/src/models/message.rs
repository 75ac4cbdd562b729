use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    TaskHandoff,
    StatusUpdate,
    DataRequest,
    DataResponse,
    Escalation,
    Notification,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaskHandoff => "task_handoff",
            Self::StatusUpdate => "status_update",
            Self::DataRequest => "data_request",
            Self::DataResponse => "data_response",
            Self::Escalation => "escalation",
            Self::Notification => "notification",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "task_handoff" => Some(Self::TaskHandoff),
            "status_update" => Some(Self::StatusUpdate),
            "data_request" => Some(Self::DataRequest),
            "data_response" => Some(Self::DataResponse),
            "escalation" => Some(Self::Escalation),
            "notification" => Some(Self::Notification),
            _ => None,
        }
    }
}

/// Delivery status of a message.
///
/// A message is created `Pending` and moves at most once, to `Delivered` or
/// `Failed`. `Read` exists for clients that track receipts but no core
/// transition produces it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Delivered,
    Failed,
    Read,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
            Self::Read => "read",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "delivered" => Some(Self::Delivered),
            "failed" => Some(Self::Failed),
            "read" => Some(Self::Read),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub tenant_id: String,
    pub sender_id: String,
    pub recipient_id: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub payload: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    pub status: MessageStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn new(
        id: String,
        tenant_id: String,
        sender_id: String,
        recipient_id: String,
        message_type: MessageType,
        payload: serde_json::Value,
        correlation_id: Option<String>,
    ) -> Self {
        Self {
            id,
            tenant_id,
            sender_id,
            recipient_id,
            message_type,
            payload,
            correlation_id,
            status: MessageStatus::Pending,
            created_at: Utc::now(),
            delivered_at: None,
        }
    }
}

/// Body of a send request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageInput {
    pub recipient_id: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub correlation_id: Option<String>,
}

/// Filters shared by the paginated listings and the export.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageFilter {
    #[serde(default, rename = "type")]
    pub message_type: Option<MessageType>,
    #[serde(default)]
    pub status: Option<MessageStatus>,
    #[serde(default)]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub sender_id: Option<String>,
    #[serde(default)]
    pub recipient_id: Option<String>,
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
    /// Substring match against the serialized payload.
    #[serde(default)]
    pub search: Option<String>,
}

/// Cursor pagination request. The cursor is the id of the last row of the
/// previous page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_next_page: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page_info: PageInfo,
}

impl<T> Page<T> {
    /// Build a page from `limit + 1` fetched rows: the extra row only signals
    /// that another page exists.
    pub fn from_overfetch(mut rows: Vec<T>, limit: usize, id_of: impl Fn(&T) -> String) -> Self {
        let has_next_page = rows.len() > limit;
        rows.truncate(limit);
        let next_cursor = if has_next_page {
            rows.last().map(&id_of)
        } else {
            None
        };
        Self {
            items: rows,
            page_info: PageInfo {
                has_next_page,
                next_cursor,
            },
        }
    }
}

/// Unpaginated bulk read.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageExport {
    pub messages: Vec<Message>,
    /// True when the row ceiling cut the result short.
    pub truncated: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageStats {
    pub total: u64,
    pub pending: u64,
    pub delivered: u64,
    pub failed: u64,
    /// Distinct correlation ids seen within the lookback window.
    pub active_threads: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_delivery_latency_ms: Option<f64>,
}
