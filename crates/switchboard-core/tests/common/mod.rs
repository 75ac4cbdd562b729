//! Shared fixtures for the switchboard-core integration tests.
//!
//! `RecordingQueue` keeps enqueued jobs in memory so a test decides when
//! (and whether) each job runs.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use switchboard_core::audit::MemoryAuditSink;
use switchboard_core::auth::TokenVerifier;
use switchboard_core::models::{
    Agent, AllowlistDirection, AllowlistEntryInput, Message, SendMessageInput, MessageType,
};
use switchboard_core::queue::{Job, JobHandler, JobQueue};
use switchboard_core::state::{AppState, AppStateInner};
use switchboard_core::{CoreConfig, Database, ServerError};

pub const TENANT: &str = "tenant-a";
pub const OTHER_TENANT: &str = "tenant-b";
pub const ACTOR: &str = "user-1";

#[derive(Default)]
pub struct RecordingQueue {
    jobs: Mutex<Vec<(Job, Duration)>>,
    failing: AtomicBool,
}

impl RecordingQueue {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn take(&self) -> Vec<(Job, Duration)> {
        std::mem::take(&mut *self.jobs.lock().unwrap())
    }

    pub fn snapshot(&self) -> Vec<(Job, Duration)> {
        self.jobs.lock().unwrap().clone()
    }
}

impl JobQueue for RecordingQueue {
    fn enqueue(&self, job: Job, delay: Duration) -> Result<(), ServerError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ServerError::Internal("queue unavailable".into()));
        }
        self.jobs.lock().unwrap().push((job, delay));
        Ok(())
    }
}

pub struct Harness {
    pub state: AppState,
    pub queue: Arc<RecordingQueue>,
    pub audit: MemoryAuditSink,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(CoreConfig::default()).await
    }

    pub async fn with_config(config: CoreConfig) -> Self {
        let db = Database::open_in_memory().expect("Failed to open in-memory database");
        let queue = Arc::new(RecordingQueue::default());
        let audit = MemoryAuditSink::new();
        let state: AppState = Arc::new(AppStateInner::new(
            db,
            config,
            queue.clone(),
            Arc::new(audit.clone()),
            TokenVerifier::new("test-secret"),
        ));
        Self {
            state,
            queue,
            audit,
        }
    }

    pub async fn add_agent(&self, id: &str, tenant_id: &str) {
        self.state
            .agent_store
            .save(&Agent::new(
                id.to_string(),
                tenant_id.to_string(),
                format!("Agent {}", id),
                None,
            ))
            .await
            .expect("Failed to save agent");
    }

    /// Replace `owner`'s allowlist with `entries`.
    pub async fn allow(&self, owner: &str, entries: &[(&str, AllowlistDirection)]) {
        let entries = entries
            .iter()
            .map(|(id, direction)| AllowlistEntryInput {
                allowed_agent_id: id.to_string(),
                direction: *direction,
            })
            .collect();
        self.state
            .allowlist
            .update_allowlist(owner, entries, TENANT, ACTOR)
            .await
            .expect("Failed to update allowlist");
    }

    pub async fn send(&self, from: &str, to: &str) -> Result<Message, ServerError> {
        self.send_with(from, to, MessageType::Notification, serde_json::json!({ "text": "hi" }), None)
            .await
    }

    pub async fn send_with(
        &self,
        from: &str,
        to: &str,
        message_type: MessageType,
        payload: serde_json::Value,
        correlation_id: Option<&str>,
    ) -> Result<Message, ServerError> {
        self.state
            .messaging
            .send_message(
                from,
                SendMessageInput {
                    recipient_id: to.to_string(),
                    message_type,
                    payload,
                    correlation_id: correlation_id.map(str::to_string),
                },
                TENANT,
                ACTOR,
            )
            .await
    }

    /// Run queued jobs in FIFO order, ignoring their delays, until the queue
    /// stays empty. Timeout jobs are dropped unless `include_timeouts`.
    pub async fn run_jobs(&self, include_timeouts: bool) -> usize {
        let runner = self.state.job_runner();
        let mut ran = 0;
        loop {
            let jobs = self.queue.take();
            if jobs.is_empty() {
                return ran;
            }
            for (job, _) in jobs {
                if !include_timeouts && matches!(job, Job::TimeoutStep { .. }) {
                    continue;
                }
                runner.handle(job).await.expect("job handler failed");
                ran += 1;
            }
        }
    }
}
