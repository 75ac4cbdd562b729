//! Short-TTL cache of permission decisions.
//!
//! Entries are read and written without coordination with allowlist writes,
//! so a decision may stay stale for up to one TTL after an update that the
//! best-effort invalidation missed.

use std::time::Duration;

use moka::future::Cache;

const DEFAULT_MAX_PAIRS: u64 = 100_000;

/// `(sender, recipient)` → allowed.
#[derive(Clone)]
pub struct PermissionCache {
    entries: Cache<(String, String), bool>,
}

impl PermissionCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_max_capacity(ttl, DEFAULT_MAX_PAIRS)
    }

    pub fn with_max_capacity(ttl: Duration, max_pairs: u64) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_pairs)
            .time_to_live(ttl)
            .support_invalidation_closures()
            .build();
        Self { entries }
    }

    /// Cached decision for `sender -> recipient`, if still fresh.
    pub async fn get(&self, sender_id: &str, recipient_id: &str) -> Option<bool> {
        self.entries
            .get(&(sender_id.to_string(), recipient_id.to_string()))
            .await
    }

    pub async fn put(&self, sender_id: &str, recipient_id: &str, allowed: bool) {
        self.entries
            .insert((sender_id.to_string(), recipient_id.to_string()), allowed)
            .await;
    }

    /// Drop every cached pair that involves `agent_id` on either side.
    pub fn invalidate_agent(&self, agent_id: &str) {
        let agent_id = agent_id.to_string();
        if let Err(e) = self
            .entries
            .invalidate_entries_if(move |(sender, recipient), _| {
                *sender == agent_id || *recipient == agent_id
            })
        {
            tracing::warn!("[Allowlist] Cache invalidation failed, clearing cache: {}", e);
            self.entries.invalidate_all();
        }
    }

    /// Entry count after pending evictions have been applied.
    pub async fn len(&self) -> u64 {
        self.entries.run_pending_tasks().await;
        self.entries.entry_count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
