use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which way messages may flow along an allowlist edge.
///
/// The edge is owned by `agent_id` and points at `allowed_agent_id`:
/// `SendOnly` lets the owner send to the counterpart, `ReceiveOnly` lets the
/// counterpart send to the owner, `Both` allows either.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AllowlistDirection {
    #[default]
    Both,
    SendOnly,
    ReceiveOnly,
}

impl AllowlistDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Both => "both",
            Self::SendOnly => "send_only",
            Self::ReceiveOnly => "receive_only",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "both" => Some(Self::Both),
            "send_only" => Some(Self::SendOnly),
            "receive_only" => Some(Self::ReceiveOnly),
            _ => None,
        }
    }

    /// The owner may send to the counterpart.
    pub fn permits_outbound(&self) -> bool {
        matches!(self, Self::Both | Self::SendOnly)
    }

    /// The counterpart may send to the owner.
    pub fn permits_inbound(&self) -> bool {
        matches!(self, Self::Both | Self::ReceiveOnly)
    }
}

/// A directed edge in the tenant's communication graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AllowlistEntry {
    pub id: String,
    pub agent_id: String,
    pub allowed_agent_id: String,
    pub direction: AllowlistDirection,
    pub created_at: DateTime<Utc>,
}

/// One requested edge in a full-replace allowlist update.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllowlistEntryInput {
    pub allowed_agent_id: String,
    #[serde(default)]
    pub direction: AllowlistDirection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAllowlistInput {
    pub entries: Vec<AllowlistEntryInput>,
}

/// Outcome of a full-replace allowlist update.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllowlistUpdate {
    pub agent_id: String,
    pub entry_count: usize,
    pub entries: Vec<AllowlistEntry>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub direction: AllowlistDirection,
}

/// Read projection of all agents and allowlist edges in one tenant.
#[derive(Debug, Clone, Serialize)]
pub struct CommunicationGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}
