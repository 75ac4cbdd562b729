use crate::events::{MessageEvent, MessageEventType, TenantBroadcaster};
use crate::queue::DeliveryJob;
use crate::store::MessageStore;

/// Confirms delivery of accepted messages.
///
/// Any error while marking a message delivered is terminal: the message is
/// marked failed instead and the job still counts as processed. Nothing is
/// retried.
#[derive(Clone)]
pub struct DeliveryWorker {
    store: MessageStore,
    broadcaster: TenantBroadcaster,
}

impl DeliveryWorker {
    pub fn new(store: MessageStore, broadcaster: TenantBroadcaster) -> Self {
        Self { store, broadcaster }
    }

    pub async fn process(&self, job: DeliveryJob) {
        match self.store.mark_delivered(&job.message_id).await {
            Ok(Some(message)) => {
                tracing::debug!(
                    "[Delivery] Delivered {} -> {} ({})",
                    message.sender_id,
                    message.recipient_id,
                    message.id
                );
                self.broadcaster.emit_message_event(
                    &job.tenant_id,
                    MessageEvent::new(MessageEventType::MessageDelivered, &message),
                );
            }
            Ok(None) => {
                tracing::debug!(
                    "[Delivery] Message {} is gone or no longer pending, skipping",
                    job.message_id
                );
            }
            Err(e) => {
                tracing::error!("[Delivery] Failed to deliver {}: {}", job.message_id, e);
                self.fail(&job).await;
            }
        }
    }

    async fn fail(&self, job: &DeliveryJob) {
        match self.store.mark_failed(&job.message_id).await {
            Ok(Some(message)) => {
                self.broadcaster.emit_message_event(
                    &job.tenant_id,
                    MessageEvent::new(MessageEventType::MessageFailed, &message),
                );
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(
                    "[Delivery] Could not mark {} failed either: {}",
                    job.message_id,
                    e
                );
            }
        }
    }
}
