//! Workflow engine - multi-step agent coordination on top of messaging.
//!
//! # Architecture
//!
//! ```text
//! builtin/*.yaml ──► WorkflowTemplate ──► WorkflowOrchestrator::trigger_workflow
//!                                               │
//!                                      Job::ExecuteStep / Job::TimeoutStep
//!                                               │
//!                              AllowlistService + MessagingService (fan-out)
//! ```

pub mod builtin;
pub mod orchestrator;
pub mod schema;

pub use orchestrator::WorkflowOrchestrator;
pub use schema::{
    InstanceFilter, InstanceStatus, StepLog, StepStatus, StepType, TriggerWorkflowInput,
    WorkflowInput, WorkflowInstance, WorkflowStep, WorkflowTemplate,
};
