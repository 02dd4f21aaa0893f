//! EventDispatcher — turns decoded wire frames into internal events.
//!
//! Behavior is a closed table: every server event type either maps to exactly
//! one internal event, sits on the explicit ignore list, or gets a warning.
//! Payload validation happens here; a frame that fails validation is logged
//! and dropped without disturbing any state.

use std::collections::HashSet;
use std::sync::Arc;

use once_cell::sync::Lazy;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::events::bus::EventBus;
use crate::events::{EventData, VoiceAssistantEvent};
use crate::protocol::server::{
    ApiErrorEvent, AssistantTranscriptEvent, AudioDeltaEvent, SessionCreatedEvent, TruncatedEvent,
    UserTranscriptEvent,
};
use crate::tools::FunctionCallItem;

/// Server events the orchestrator deliberately does not react to.
/// Deltas are ignored because we only act on completed payloads; lifecycle
/// chatter is ignored because the response-level events carry everything the
/// state machine needs.
static IGNORED_EVENTS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    IGNORED_EVENT_TYPES.iter().copied().collect()
});

const IGNORED_EVENT_TYPES: &[&str] = &[
    "transcription_session.created",
    "transcription_session.updated",
    "conversation.created",
    "conversation.deleted",
    "conversation.item.created",
    "conversation.item.added",
    "conversation.item.done",
    "conversation.item.retrieved",
    "conversation.item.deleted",
    "conversation.item.input_audio_transcription.delta",
    "conversation.item.input_audio_transcription.segment",
    "conversation.item.input_audio_transcription.failed",
    "input_audio_buffer.committed",
    "input_audio_buffer.cleared",
    "input_audio_buffer.timeout_triggered",
    "response.output_item.added",
    "response.output_item.done",
    "response.content_part.added",
    "response.content_part.done",
    "response.output_text.delta",
    "response.output_text.done",
    "response.output_audio_transcript.delta",
    "response.output_audio.done",
    "response.function_call_arguments.delta",
    "mcp_call_arguments.delta",
    "mcp_list_tools.in_progress",
    "mcp_list_tools.completed",
    "mcp_list_tools.failed",
    "response.mcp_call.in_progress",
    "rate_limits.updated",
];

pub struct EventDispatcher {
    bus: Arc<EventBus>,
}

impl EventDispatcher {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus }
    }

    /// Route one inbound frame. Publishes at most one internal event.
    pub fn dispatch(&self, frame: Value) {
        let Some(event_type) = frame.get("type").and_then(Value::as_str) else {
            warn!("Received event without type field: {frame}");
            return;
        };
        let event_type = event_type.to_string();

        if IGNORED_EVENTS.contains(event_type.as_str()) {
            debug!("Ignoring event: {event_type}");
            return;
        }

        match event_type.as_str() {
            "input_audio_buffer.speech_started" => {
                debug!("User started speaking");
                self.publish(VoiceAssistantEvent::UserStartedSpeaking, None);
            }
            "input_audio_buffer.speech_stopped" => {
                debug!("User speech ended");
                self.publish(VoiceAssistantEvent::UserSpeechEnded, None);
            }
            "response.output_audio.delta" => self.handle_audio_delta(frame),
            "conversation.item.input_audio_transcription.completed" => {
                self.validated::<UserTranscriptEvent>(&event_type, frame, |payload| {
                    (
                        VoiceAssistantEvent::UserTranscriptCompleted,
                        Some(EventData::UserTranscript(payload)),
                    )
                });
            }
            "response.output_audio_transcript.done" => {
                self.validated::<AssistantTranscriptEvent>(&event_type, frame, |payload| {
                    (
                        VoiceAssistantEvent::AssistantTranscriptCompleted,
                        Some(EventData::AssistantTranscript(payload)),
                    )
                });
            }
            "response.function_call_arguments.done" => {
                self.validated::<FunctionCallItem>(&event_type, frame, |item| {
                    info!(
                        "Function call initiated - tool: {}, call_id: {}",
                        item.name.as_deref().unwrap_or("<unnamed>"),
                        item.call_id
                    );
                    (
                        VoiceAssistantEvent::AssistantStartedToolCall,
                        Some(EventData::FunctionCall(item)),
                    )
                });
            }
            "conversation.item.truncated" => {
                self.validated::<TruncatedEvent>(&event_type, frame, |payload| {
                    info!(
                        "Conversation item truncated - item: {}, audio_end_ms: {}",
                        payload.item_id, payload.audio_end_ms
                    );
                    (
                        VoiceAssistantEvent::AssistantSpeechInterrupted,
                        Some(EventData::Truncated(payload)),
                    )
                });
            }
            "mcp_call_arguments.done" => {
                info!("Remote tool call arguments completed");
                self.publish(VoiceAssistantEvent::AssistantStartedRemoteToolCall, None);
            }
            "response.mcp_call.completed" => {
                info!("Remote tool call completed");
                self.publish(
                    VoiceAssistantEvent::AssistantCompletedRemoteToolCallResult,
                    None,
                );
            }
            "response.mcp_call.failed" => {
                let message = frame
                    .pointer("/error/message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown remote tool error");
                error!("Remote tool call failed: {message}");
                self.publish(
                    VoiceAssistantEvent::AssistantFailedRemoteToolCall,
                    Some(EventData::Json(frame)),
                );
            }
            "response.created" => {
                debug!("Assistant response started");
                self.publish(VoiceAssistantEvent::AssistantStartedResponse, None);
            }
            "response.done" => {
                debug!("Assistant response completed");
                self.publish(VoiceAssistantEvent::AssistantCompletedResponse, None);
            }
            "session.created" => match serde_json::from_value::<SessionCreatedEvent>(frame) {
                Ok(event) => debug!("Session created, remote config: {}", event.session),
                Err(e) => warn!("Malformed session.created event: {e}"),
            },
            "session.updated" => {}
            "error" => self.handle_api_error(frame),
            other => warn!("Unknown server event type: {other}"),
        }
    }

    fn handle_audio_delta(&self, frame: Value) {
        let delta = match serde_json::from_value::<AudioDeltaEvent>(frame) {
            Ok(delta) => delta,
            Err(e) => {
                warn!("Invalid audio delta payload: {e}");
                return;
            }
        };
        if delta.delta.is_empty() {
            warn!("Received empty audio delta");
            return;
        }
        self.publish(
            VoiceAssistantEvent::AudioChunkReceived,
            Some(EventData::Audio(delta)),
        );
    }

    fn handle_api_error(&self, frame: Value) {
        let error_event = match serde_json::from_value::<ApiErrorEvent>(frame) {
            Ok(event) => event,
            Err(e) => {
                warn!("Malformed error event: {e}");
                return;
            }
        };
        error!(
            "Realtime API error: {} (type: {}, code: {})",
            error_event.error.message,
            error_event.error.kind.as_deref().unwrap_or("unknown"),
            error_event.error.code.as_deref().unwrap_or("-")
        );
        self.publish(
            VoiceAssistantEvent::ErrorOccurred,
            Some(EventData::ApiError(error_event)),
        );
    }

    /// Validate a payload against its schema, then map it to an internal
    /// event. Validation failure logs and drops the frame.
    fn validated<T: serde::de::DeserializeOwned>(
        &self,
        event_type: &str,
        frame: Value,
        map: impl FnOnce(T) -> (VoiceAssistantEvent, Option<EventData>),
    ) {
        match serde_json::from_value::<T>(frame) {
            Ok(payload) => {
                let (event, data) = map(payload);
                self.publish(event, data);
            }
            Err(e) => warn!("Invalid {event_type} payload: {e}"),
        }
    }

    fn publish(&self, event: VoiceAssistantEvent, data: Option<EventData>) {
        self.bus.publish_sync(event, data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::bus::Handler;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::time::Duration;

    async fn recording_dispatcher() -> (
        EventDispatcher,
        Arc<Mutex<Vec<(VoiceAssistantEvent, Option<EventData>)>>>,
    ) {
        let bus = Arc::new(EventBus::new().unwrap());
        bus.attach_runtime(tokio::runtime::Handle::current());
        let seen = Arc::new(Mutex::new(Vec::new()));

        for event in [
            VoiceAssistantEvent::UserStartedSpeaking,
            VoiceAssistantEvent::UserSpeechEnded,
            VoiceAssistantEvent::AudioChunkReceived,
            VoiceAssistantEvent::AssistantStartedResponse,
            VoiceAssistantEvent::AssistantCompletedResponse,
            VoiceAssistantEvent::AssistantStartedToolCall,
            VoiceAssistantEvent::AssistantSpeechInterrupted,
            VoiceAssistantEvent::ErrorOccurred,
        ] {
            let seen = seen.clone();
            bus.subscribe(
                event,
                Handler::sync2(move |event, data| {
                    seen.lock().push((event, data));
                    Ok(())
                }),
            );
        }

        (EventDispatcher::new(bus), seen)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_speech_boundaries_map_to_internal_events() {
        let (dispatcher, seen) = recording_dispatcher().await;
        dispatcher.dispatch(json!({"type": "input_audio_buffer.speech_started"}));
        dispatcher.dispatch(json!({"type": "input_audio_buffer.speech_stopped"}));
        settle().await;

        let events: Vec<_> = seen.lock().iter().map(|(e, _)| *e).collect();
        assert_eq!(
            events,
            vec![
                VoiceAssistantEvent::UserStartedSpeaking,
                VoiceAssistantEvent::UserSpeechEnded,
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_empty_audio_delta_dropped() {
        let (dispatcher, seen) = recording_dispatcher().await;
        dispatcher.dispatch(json!({
            "type": "response.output_audio.delta",
            "item_id": "R1",
            "delta": ""
        }));
        settle().await;
        assert!(seen.lock().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_audio_delta_published_with_payload() {
        let (dispatcher, seen) = recording_dispatcher().await;
        dispatcher.dispatch(json!({
            "type": "response.output_audio.delta",
            "item_id": "R1",
            "delta": "AAAA"
        }));
        settle().await;

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        match &seen[0] {
            (VoiceAssistantEvent::AudioChunkReceived, Some(EventData::Audio(delta))) => {
                assert_eq!(delta.item_id, "R1");
                assert_eq!(delta.delta, "AAAA");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unknown_type_ignored() {
        let (dispatcher, seen) = recording_dispatcher().await;
        dispatcher.dispatch(json!({"type": "response.audio.delta", "delta": ""}));
        dispatcher.dispatch(json!({"type": "totally.new.event"}));
        settle().await;
        assert!(seen.lock().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_ignored_events_publish_nothing() {
        let (dispatcher, seen) = recording_dispatcher().await;
        dispatcher.dispatch(json!({"type": "rate_limits.updated"}));
        dispatcher.dispatch(json!({"type": "response.output_text.delta", "delta": "hi"}));
        dispatcher.dispatch(json!({"type": "session.updated"}));
        settle().await;
        assert!(seen.lock().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_function_call_done_carries_item() {
        let (dispatcher, seen) = recording_dispatcher().await;
        dispatcher.dispatch(json!({
            "type": "response.function_call_arguments.done",
            "name": "get_time",
            "call_id": "C7",
            "arguments": "{}"
        }));
        settle().await;

        let seen = seen.lock();
        match &seen[0] {
            (VoiceAssistantEvent::AssistantStartedToolCall, Some(EventData::FunctionCall(item))) => {
                assert_eq!(item.name.as_deref(), Some("get_time"));
                assert_eq!(item.call_id, "C7");
                assert!(item.arguments.is_empty());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_error_event_maps_to_error_occurred() {
        let (dispatcher, seen) = recording_dispatcher().await;
        dispatcher.dispatch(json!({
            "type": "error",
            "error": {"message": "session expired", "type": "invalid_request_error"}
        }));
        settle().await;

        let seen = seen.lock();
        match &seen[0] {
            (VoiceAssistantEvent::ErrorOccurred, Some(EventData::ApiError(e))) => {
                assert_eq!(e.error.message, "session expired");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
