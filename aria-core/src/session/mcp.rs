//! RemoteToolHandler — coordination for MCP tool calls the remote executes.
//!
//! The model runs remote (MCP) tools itself; the orchestrator only nudges it
//! afterwards so the user hears a spoken result. On completion we ask it to
//! present the outcome, on failure to explain the problem. No tool is ever
//! executed locally here.

use std::sync::Arc;

use tracing::{error, info};

use crate::events::bus::{EventBus, Handler};
use crate::events::VoiceAssistantEvent;
use crate::protocol::client::ClientEvent;
use crate::transport::Outbound;

const REMOTE_COMPLETED_INSTRUCTION: &str =
    "The remote tool call has completed successfully. Process the results and provide a response to the user.";

const REMOTE_FAILED_INSTRUCTION: &str =
    "Something went wrong with the remote tool call. Inform the user about the issue.";

pub struct RemoteToolHandler {
    outbound: Outbound,
}

impl RemoteToolHandler {
    pub fn new(outbound: Outbound) -> Arc<Self> {
        Arc::new(Self { outbound })
    }

    pub fn subscribe(self: &Arc<Self>, bus: &EventBus) {
        let handler = self.clone();
        bus.subscribe(
            VoiceAssistantEvent::AssistantCompletedRemoteToolCallResult,
            Handler::sync0(move || {
                info!("Remote tool call completed - triggering result presentation");
                handler.trigger_response(REMOTE_COMPLETED_INSTRUCTION);
                Ok(())
            }),
        );

        let handler = self.clone();
        bus.subscribe(
            VoiceAssistantEvent::AssistantFailedRemoteToolCall,
            Handler::sync0(move || {
                info!("Remote tool call failed - triggering error explanation");
                handler.trigger_response(REMOTE_FAILED_INSTRUCTION);
                Ok(())
            }),
        );
    }

    fn trigger_response(&self, instruction: &str) {
        if let Err(e) = self
            .outbound
            .send(ClientEvent::response_with_instructions(instruction))
        {
            error!("Failed to send response.create for remote tool call: {e}");
        }
    }
}
