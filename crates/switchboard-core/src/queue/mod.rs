//! Job queue - asynchronous hand-off between accepting work and doing it.
//!
//! Producers call [`JobQueue::enqueue`] with an optional delay. The
//! in-process [`TokioJobQueue`] parks delayed jobs on a timer task and feeds
//! an unbounded channel; a [`JobDispatcher`] drains that channel and runs
//! every job on its own task.
//!
//! Execution is at-least-once. Handlers guard on persisted status so a
//! duplicate or late job is a no-op.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ServerError;
use crate::models::message::MessageType;

/// Routing metadata for one delivery attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryJob {
    pub message_id: String,
    pub tenant_id: String,
    pub sender_id: String,
    pub recipient_id: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Job {
    DeliverMessage(DeliveryJob),
    ExecuteStep {
        instance_id: String,
        step_index: usize,
    },
    TimeoutStep {
        instance_id: String,
        step_index: usize,
    },
}

impl Job {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DeliverMessage(_) => "deliver_message",
            Self::ExecuteStep { .. } => "execute_step",
            Self::TimeoutStep { .. } => "timeout_step",
        }
    }
}

pub trait JobQueue: Send + Sync {
    /// Schedule `job` to run after `delay`. An error means the job was not
    /// accepted; it is never retried by the queue.
    fn enqueue(&self, job: Job, delay: Duration) -> Result<(), ServerError>;
}

pub type JobReceiver = mpsc::UnboundedReceiver<Job>;

/// In-process queue on top of tokio.
#[derive(Clone)]
pub struct TokioJobQueue {
    tx: mpsc::UnboundedSender<Job>,
}

impl TokioJobQueue {
    pub fn new() -> (Self, JobReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl JobQueue for TokioJobQueue {
    fn enqueue(&self, job: Job, delay: Duration) -> Result<(), ServerError> {
        if self.tx.is_closed() {
            return Err(ServerError::Internal(format!(
                "Job queue is closed, dropping {} job",
                job.kind()
            )));
        }
        if delay.is_zero() {
            return self
                .tx
                .send(job)
                .map_err(|e| ServerError::Internal(format!("Job queue is closed: {}", e)));
        }

        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| ServerError::Internal(format!("No runtime for delayed job: {}", e)))?;
        let tx = self.tx.clone();
        handle.spawn(async move {
            tokio::time::sleep(delay).await;
            let kind = job.kind();
            if tx.send(job).is_err() {
                tracing::warn!("[JobQueue] Consumer gone, dropped delayed {} job", kind);
            }
        });
        Ok(())
    }
}

/// Something that can run a job to completion.
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    async fn handle(&self, job: Job) -> Result<(), ServerError>;
}

/// Drains a [`JobReceiver`], spawning one task per job.
pub struct JobDispatcher {
    rx: JobReceiver,
    handler: Arc<dyn JobHandler>,
}

impl JobDispatcher {
    pub fn new(rx: JobReceiver, handler: Arc<dyn JobHandler>) -> Self {
        Self { rx, handler }
    }

    /// Run until every sender has been dropped.
    pub async fn run(mut self) {
        tracing::info!("[JobQueue] Dispatcher started");
        while let Some(job) = self.rx.recv().await {
            let handler = self.handler.clone();
            tokio::spawn(async move {
                let kind = job.kind();
                if let Err(e) = handler.handle(job).await {
                    tracing::error!("[JobQueue] {} job failed: {}", kind, e);
                }
            });
        }
        tracing::info!("[JobQueue] Dispatcher stopped");
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn execute(step_index: usize) -> Job {
        Job::ExecuteStep {
            instance_id: "wf-1".into(),
            step_index,
        }
    }

    #[tokio::test]
    async fn immediate_jobs_arrive_in_order() {
        let (queue, mut rx) = TokioJobQueue::new();
        queue.enqueue(execute(0), Duration::ZERO).unwrap();
        queue.enqueue(execute(1), Duration::ZERO).unwrap();
        assert_eq!(rx.recv().await, Some(execute(0)));
        assert_eq!(rx.recv().await, Some(execute(1)));
    }

    #[tokio::test]
    async fn delayed_jobs_wait_for_their_delay() {
        let (queue, mut rx) = TokioJobQueue::new();
        queue.enqueue(execute(1), Duration::from_millis(50)).unwrap();
        queue.enqueue(execute(0), Duration::ZERO).unwrap();
        assert_eq!(rx.recv().await, Some(execute(0)));
        assert!(rx.try_recv().is_err());
        assert_eq!(rx.recv().await, Some(execute(1)));
    }

    #[tokio::test]
    async fn enqueue_fails_once_consumer_is_gone() {
        let (queue, rx) = TokioJobQueue::new();
        drop(rx);
        assert!(queue.enqueue(execute(0), Duration::ZERO).is_err());
    }

    #[test]
    fn delayed_enqueue_outside_runtime_fails() {
        let (queue, _rx) = TokioJobQueue::new();
        let err = queue
            .enqueue(execute(0), Duration::from_millis(10))
            .unwrap_err();
        assert!(matches!(err, ServerError::Internal(_)));
    }

    #[test]
    fn job_serializes_with_kind_tag() {
        let json = serde_json::to_value(execute(2)).unwrap();
        assert_eq!(json["kind"], "execute_step");
        assert_eq!(json["step_index"], 2);
    }
}
