pub mod agent_store;
pub mod allowlist_store;
pub mod message_store;
pub mod workflow_store;

pub use agent_store::AgentStore;
pub use allowlist_store::AllowlistStore;
pub use message_store::{MessageScope, MessageStore};
pub use workflow_store::WorkflowStore;
