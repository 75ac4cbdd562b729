pub mod agent;
pub mod allowlist;
pub mod message;

pub use agent::*;
pub use allowlist::*;
pub use message::*;
