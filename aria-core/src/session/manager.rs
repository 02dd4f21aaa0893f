//! MessageManager — the outbound side of the session.
//!
//! Owns session initialization, tool-result submission, generator-tool
//! progress updates, barge-in truncation, and runtime config updates. All
//! tool-driven sends respect the pending queue: while a response is active
//! they wait, then drain in FIFO order with a short pacing delay.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{error, info, warn};

use crate::audio_constants::OUTBOUND_PACING_MS;
use crate::config::AssistantSettings;
use crate::error::{AssistantError, Result};
use crate::events::bus::{EventArg, EventBus, Handler};
use crate::events::{EventData, VoiceAssistantEvent};
use crate::protocol::client::ClientEvent;
use crate::protocol::session::SessionConfig;
use crate::session::context::CurrentResponseContext;
use crate::session::queue::{OutboundMessage, PendingQueue};
use crate::tools::registry::ToolRegistry;
use crate::tools::FunctionCallResult;
use crate::transport::Outbound;

/// Default instruction when a tool result carries none of its own
const DEFAULT_TOOL_RESULT_INSTRUCTION: &str =
    "Process the tool result and provide a helpful response.";

pub struct MessageManager {
    outbound: Outbound,
    context: Arc<CurrentResponseContext>,
    registry: Arc<ToolRegistry>,
    settings: Arc<RwLock<AssistantSettings>>,
    queue: PendingQueue,
}

impl MessageManager {
    pub fn new(
        outbound: Outbound,
        context: Arc<CurrentResponseContext>,
        registry: Arc<ToolRegistry>,
        settings: Arc<RwLock<AssistantSettings>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            outbound,
            context,
            registry,
            settings,
            queue: PendingQueue::new(),
        })
    }

    /// Wire response lifecycle, interruption, and config-update handling.
    pub fn subscribe(self: &Arc<Self>, bus: &EventBus) {
        let manager = self.clone();
        bus.subscribe(
            VoiceAssistantEvent::AssistantStartedResponse,
            Handler::sync0(move || {
                manager.queue.set_response_active(true);
                Ok(())
            }),
        );

        let manager = self.clone();
        bus.subscribe(
            VoiceAssistantEvent::AssistantCompletedResponse,
            Handler::async0(move || {
                let manager = manager.clone();
                async move {
                    manager.queue.set_response_active(false);
                    manager.drain_queue().await;
                    Ok(())
                }
            }),
        );

        let manager = self.clone();
        bus.subscribe(
            VoiceAssistantEvent::AssistantSpeechInterrupted,
            Handler::async0(move || {
                let manager = manager.clone();
                async move {
                    manager.handle_interruption();
                    Ok(())
                }
            }),
        );

        let manager = self.clone();
        bus.subscribe(
            VoiceAssistantEvent::AssistantConfigUpdateRequest,
            Handler::async1(move |arg| {
                let manager = manager.clone();
                async move {
                    if let EventArg::Data(EventData::ConfigUpdate(update)) = arg {
                        manager.apply_config_update(update);
                    }
                    Ok(())
                }
            }),
        );
    }

    /// Build the `session.update` from the live settings and send it once.
    /// Failure here is fatal to the session.
    pub fn initialize_session(&self) -> Result<()> {
        let config = self.build_session_config();
        info!("Sending session update...");
        self.outbound
            .send(ClientEvent::SessionUpdate {
                session: Box::new(config),
            })
            .map_err(|e| {
                error!("Failed to send session update: {e}");
                AssistantError::Transport("session initialization failed".to_string())
            })?;
        info!("Session update sent");
        Ok(())
    }

    /// Submit a tool result: a `function_call_output` item followed by a
    /// `response.create`. Queued while a response is active.
    pub async fn send_tool_result(&self, result: FunctionCallResult) {
        if let Some(message) = self.queue.enqueue_or_pass(OutboundMessage::ToolResult(result)) {
            self.send_now(message);
        }
    }

    /// Submit a generator-tool progress update: one `response.create` that
    /// instructs the model to speak exactly the supplied chunk.
    pub async fn send_generator_update(&self, chunk: String) {
        if let Some(message) = self
            .queue
            .enqueue_or_pass(OutboundMessage::GeneratorUpdate(chunk))
        {
            self.send_now(message);
        }
    }

    /// Whether the remote is currently generating a response.
    pub fn is_response_active(&self) -> bool {
        self.queue.is_response_active()
    }

    fn send_now(&self, message: OutboundMessage) {
        match message {
            OutboundMessage::ToolResult(result) => {
                info!("Sending tool result for '{}'", result.tool_name);
                if let Err(e) = self.outbound.send(result.to_conversation_item()) {
                    error!(
                        "Failed to send function_call_output for '{}': {e}",
                        result.tool_name
                    );
                    return;
                }
                let instruction = result
                    .response_instruction
                    .clone()
                    .unwrap_or_else(|| DEFAULT_TOOL_RESULT_INSTRUCTION.to_string());
                if let Err(e) = self
                    .outbound
                    .send(ClientEvent::response_with_instructions(instruction))
                {
                    error!("Failed to send response.create: {e}");
                }
            }
            OutboundMessage::GeneratorUpdate(chunk) => {
                info!("Sending generator tool update");
                let instruction = format!(
                    "Say exactly: '{chunk}'. Do not add any information not in this message."
                );
                if let Err(e) = self
                    .outbound
                    .send(ClientEvent::response_with_instructions(instruction))
                {
                    error!("Failed to send response.create for generator update: {e}");
                }
            }
        }
    }

    /// Drain queued messages serially with pacing, right after a response
    /// completes. A response starting mid-drain pauses it; the next
    /// completion resumes.
    async fn drain_queue(&self) {
        if !self.queue.begin_drain() {
            return;
        }
        while let Some(message) = self.queue.pop_for_drain() {
            self.send_now(message);
            tokio::time::sleep(Duration::from_millis(OUTBOUND_PACING_MS)).await;
        }
        self.queue.end_drain();
    }

    /// Barge-in truncation. If the response context holds both an item_id
    /// and an elapsed duration, tell the remote where playback stopped so
    /// the conversation history matches what was actually heard. The first
    /// response (or a race) may leave either absent, in which case there is
    /// nothing to truncate.
    fn handle_interruption(&self) {
        let (item_id, elapsed_ms) = self.context.take_for_truncation();
        let (Some(item_id), Some(audio_end_ms)) = (item_id, elapsed_ms) else {
            return;
        };

        info!("Truncating item {item_id} at {audio_end_ms} ms");
        if let Err(e) = self.outbound.send(ClientEvent::ConversationItemTruncate {
            item_id,
            content_index: 0,
            audio_end_ms,
        }) {
            error!("Failed to send truncate message: {e}");
        }
    }

    /// Apply a runtime settings change and push the resulting session config.
    fn apply_config_update(&self, update: crate::config::ConfigUpdateRequest) {
        {
            let mut settings = self.settings.write();
            if let Some(speed) = update.speech_speed {
                settings.voice.set_speech_speed(speed);
            }
            if let Some(voice) = update.voice {
                settings.voice.voice = voice;
            }
            if let Some(instructions) = update.instructions {
                settings.model.instructions = Some(instructions);
            }
        }

        info!("Applying config update, re-sending session configuration");
        let config = self.build_session_config();
        if let Err(e) = self.outbound.send(ClientEvent::SessionUpdate {
            session: Box::new(config),
        }) {
            warn!("Failed to send config update: {e}");
        }
    }

    fn build_session_config(&self) -> SessionConfig {
        SessionConfig::build(&self.settings.read(), self.registry.definitions())
    }
}
