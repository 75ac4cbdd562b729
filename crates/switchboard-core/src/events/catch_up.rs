use std::time::Duration;

use chrono::{DateTime, Utc};

use super::{MessageEvent, MessageEventType};
use crate::error::ServerError;
use crate::store::MessageStore;

/// Clamp a client-supplied `since` into `[now - window, now]`.
pub fn clamp_since(since: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    let window = chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::zero());
    since.max(now - window).min(now)
}

/// Replay what a reconnecting client missed, oldest first.
///
/// Each message becomes the event matching its current status. Only the
/// first `limit` messages after the clamped `since` are returned.
pub async fn catch_up(
    store: &MessageStore,
    tenant_id: &str,
    since: DateTime<Utc>,
    window: Duration,
    limit: usize,
) -> Result<Vec<MessageEvent>, ServerError> {
    let since = clamp_since(since, Utc::now(), window);
    let messages = store.list_since(tenant_id, since, limit).await?;
    tracing::debug!(
        "[Broadcast] Catch-up for tenant {} since {}: {} messages",
        tenant_id,
        since,
        messages.len()
    );
    Ok(messages
        .iter()
        .map(|m| MessageEvent::new(MessageEventType::for_status(m.status), m))
        .collect())
}
