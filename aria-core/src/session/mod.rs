//! Session layer — everything the orchestrator sends to the remote side.
//!
//! `MessageManager` owns session initialization, tool-result submission,
//! generator-tool progress updates, barge-in truncation, and the outbound
//! queue that holds messages back while a response is being generated.

pub mod context;
pub mod manager;
pub mod mcp;
pub mod queue;

pub use context::CurrentResponseContext;
pub use manager::MessageManager;
pub use mcp::RemoteToolHandler;
pub use queue::{OutboundMessage, PendingQueue};
