//! Internal events — the closed vocabulary everything in the assistant
//! communicates with.
//!
//! Every remote protocol event the dispatcher consumes maps to exactly one of
//! these (or is explicitly ignored). Components never call each other across
//! threads; they publish here.

pub mod bus;
pub mod dispatcher;

use crate::config::ConfigUpdateRequest;
use crate::protocol::server::{
    ApiErrorEvent, AssistantTranscriptEvent, AudioDeltaEvent, TruncatedEvent, UserTranscriptEvent,
};
use crate::tools::FunctionCallItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoiceAssistantEvent {
    WakeWordDetected,
    UserStartedSpeaking,
    UserSpeechEnded,
    UserTranscriptCompleted,
    AudioChunkReceived,
    AssistantStartedResponse,
    AssistantCompletedResponse,
    AssistantTranscriptCompleted,
    AssistantSpeechInterrupted,
    AssistantStartedToolCall,
    AssistantReceivedToolCallResult,
    AssistantStartedRemoteToolCall,
    AssistantCompletedRemoteToolCallResult,
    AssistantFailedRemoteToolCall,
    IdleTransition,
    TimeoutOccurred,
    AssistantConfigUpdateRequest,
    ErrorOccurred,
}

impl VoiceAssistantEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoiceAssistantEvent::WakeWordDetected => "wake_word_detected",
            VoiceAssistantEvent::UserStartedSpeaking => "user_started_speaking",
            VoiceAssistantEvent::UserSpeechEnded => "user_speech_ended",
            VoiceAssistantEvent::UserTranscriptCompleted => "user_transcript_completed",
            VoiceAssistantEvent::AudioChunkReceived => "audio_chunk_received",
            VoiceAssistantEvent::AssistantStartedResponse => "assistant_started_response",
            VoiceAssistantEvent::AssistantCompletedResponse => "assistant_completed_response",
            VoiceAssistantEvent::AssistantTranscriptCompleted => "assistant_transcript_completed",
            VoiceAssistantEvent::AssistantSpeechInterrupted => "assistant_speech_interrupted",
            VoiceAssistantEvent::AssistantStartedToolCall => "assistant_started_tool_call",
            VoiceAssistantEvent::AssistantReceivedToolCallResult => {
                "assistant_received_tool_call_result"
            }
            VoiceAssistantEvent::AssistantStartedRemoteToolCall => {
                "assistant_started_remote_tool_call"
            }
            VoiceAssistantEvent::AssistantCompletedRemoteToolCallResult => {
                "assistant_completed_remote_tool_call_result"
            }
            VoiceAssistantEvent::AssistantFailedRemoteToolCall => {
                "assistant_failed_remote_tool_call"
            }
            VoiceAssistantEvent::IdleTransition => "idle_transition",
            VoiceAssistantEvent::TimeoutOccurred => "timeout_occurred",
            VoiceAssistantEvent::AssistantConfigUpdateRequest => "assistant_config_update_request",
            VoiceAssistantEvent::ErrorOccurred => "error_occurred",
        }
    }
}

impl std::fmt::Display for VoiceAssistantEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed payloads carried alongside events. Most events carry nothing; the
/// ones that do are validated at the dispatcher boundary, so downstream
/// handlers can match without re-checking.
#[derive(Debug, Clone)]
pub enum EventData {
    Audio(AudioDeltaEvent),
    UserTranscript(UserTranscriptEvent),
    AssistantTranscript(AssistantTranscriptEvent),
    FunctionCall(FunctionCallItem),
    Truncated(TruncatedEvent),
    ApiError(ApiErrorEvent),
    ConfigUpdate(ConfigUpdateRequest),
    /// Raw payloads for events with no dedicated schema
    Json(serde_json::Value),
}
