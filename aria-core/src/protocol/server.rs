//! Server → client event payloads.
//!
//! The dispatcher matches on the frame's `type` string and then validates the
//! payload against one of these structs. Unknown fields are tolerated — the
//! remote adds fields without notice — but the fields the orchestrator relies
//! on are required.

use serde::Deserialize;

/// `response.output_audio.delta` — one base64 PCM16 chunk of assistant audio.
#[derive(Debug, Clone, Deserialize)]
pub struct AudioDeltaEvent {
    pub item_id: String,
    /// Base64-encoded audio bytes
    pub delta: String,
    #[serde(default)]
    pub response_id: Option<String>,
    #[serde(default)]
    pub content_index: Option<u32>,
}

/// `conversation.item.input_audio_transcription.completed`
#[derive(Debug, Clone, Deserialize)]
pub struct UserTranscriptEvent {
    pub transcript: String,
    #[serde(default)]
    pub item_id: Option<String>,
}

/// `response.output_audio_transcript.done`
#[derive(Debug, Clone, Deserialize)]
pub struct AssistantTranscriptEvent {
    pub transcript: String,
    #[serde(default)]
    pub item_id: Option<String>,
    #[serde(default)]
    pub response_id: Option<String>,
}

/// `conversation.item.truncated` — acknowledgment of a truncation.
#[derive(Debug, Clone, Deserialize)]
pub struct TruncatedEvent {
    pub item_id: String,
    pub content_index: u32,
    pub audio_end_ms: u64,
}

/// `error` — structured API error. Most are recoverable; the session stays
/// open, but the state machine moves to Error.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorEvent {
    pub error: ApiErrorDetails,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorDetails {
    pub message: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

/// `session.created` — remote session config, logged for diagnostics only.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionCreatedEvent {
    #[serde(default)]
    pub session: serde_json::Value,
}
