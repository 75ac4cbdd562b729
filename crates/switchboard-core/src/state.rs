//! Shared application state for the axum server and the CLI.

use std::sync::Arc;

use async_trait::async_trait;

use crate::allowlist::{AllowlistService, PermissionCache};
use crate::audit::AuditSink;
use crate::auth::TokenVerifier;
use crate::config::CoreConfig;
use crate::db::Database;
use crate::error::ServerError;
use crate::events::TenantBroadcaster;
use crate::messaging::{DeliveryWorker, MessagingService};
use crate::queue::{Job, JobHandler, JobQueue};
use crate::store::{AgentStore, AllowlistStore, MessageStore, WorkflowStore};
use crate::workflow::WorkflowOrchestrator;

/// Shared state accessible by all API handlers.
pub struct AppStateInner {
    pub db: Database,
    pub config: CoreConfig,
    pub agent_store: AgentStore,
    pub message_store: MessageStore,
    pub workflow_store: WorkflowStore,
    pub allowlist: AllowlistService,
    pub messaging: MessagingService,
    pub delivery: DeliveryWorker,
    pub orchestrator: WorkflowOrchestrator,
    pub broadcaster: TenantBroadcaster,
    pub token_verifier: TokenVerifier,
}

pub type AppState = Arc<AppStateInner>;

impl AppStateInner {
    pub fn new(
        db: Database,
        config: CoreConfig,
        queue: Arc<dyn JobQueue>,
        audit: Arc<dyn AuditSink>,
        token_verifier: TokenVerifier,
    ) -> Self {
        let agent_store = AgentStore::new(db.clone());
        let message_store = MessageStore::new(db.clone());
        let workflow_store = WorkflowStore::new(db.clone());
        let broadcaster = TenantBroadcaster::new();

        let allowlist = AllowlistService::new(
            AllowlistStore::new(db.clone()),
            agent_store.clone(),
            PermissionCache::new(config.permission_cache_ttl),
            audit.clone(),
        );
        let messaging = MessagingService::new(
            message_store.clone(),
            agent_store.clone(),
            allowlist.clone(),
            queue.clone(),
            broadcaster.clone(),
            audit.clone(),
            config.clone(),
        );
        let delivery = DeliveryWorker::new(message_store.clone(), broadcaster.clone());
        let orchestrator = WorkflowOrchestrator::new(
            workflow_store.clone(),
            agent_store.clone(),
            allowlist.clone(),
            messaging.clone(),
            queue,
            audit,
            config.clone(),
        );

        Self {
            db,
            config,
            agent_store,
            message_store,
            workflow_store,
            allowlist,
            messaging,
            delivery,
            orchestrator,
            broadcaster,
            token_verifier,
        }
    }

    /// Handler that routes queued jobs to the delivery worker and the
    /// orchestrator.
    pub fn job_runner(&self) -> JobRunner {
        JobRunner {
            delivery: self.delivery.clone(),
            orchestrator: self.orchestrator.clone(),
        }
    }
}

pub struct JobRunner {
    delivery: DeliveryWorker,
    orchestrator: WorkflowOrchestrator,
}

#[async_trait]
impl JobHandler for JobRunner {
    async fn handle(&self, job: Job) -> Result<(), ServerError> {
        match job {
            Job::DeliverMessage(delivery) => {
                self.delivery.process(delivery).await;
                Ok(())
            }
            Job::ExecuteStep {
                instance_id,
                step_index,
            } => self.orchestrator.execute_step(&instance_id, step_index).await,
            Job::TimeoutStep {
                instance_id,
                step_index,
            } => self.orchestrator.timeout_step(&instance_id, step_index).await,
        }
    }
}
