//! Client → server events.
//!
//! Each variant serializes to a JSON object whose `type` field matches the
//! realtime API event name. Factories cover the handful of shapes the rest of
//! the orchestrator sends.

use serde::{Deserialize, Serialize};

use super::session::SessionConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate { session: Box<SessionConfig> },

    /// Binary audio wrapped in the protocol's JSON envelope (base64 PCM16)
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend { audio: String },

    #[serde(rename = "input_audio_buffer.commit")]
    InputAudioBufferCommit,

    #[serde(rename = "input_audio_buffer.clear")]
    InputAudioBufferClear,

    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate { item: ConversationItem },

    #[serde(rename = "conversation.item.truncate")]
    ConversationItemTruncate {
        item_id: String,
        content_index: u32,
        audio_end_ms: u64,
    },

    #[serde(rename = "response.create")]
    ResponseCreate {
        #[serde(skip_serializing_if = "Option::is_none")]
        response: Option<ResponseInstructions>,
    },

    #[serde(rename = "response.cancel")]
    ResponseCancel,

    #[serde(rename = "output_audio_buffer.clear")]
    OutputAudioBufferClear,
}

impl ClientEvent {
    /// Wrap raw PCM16 bytes in an `input_audio_buffer.append` envelope.
    pub fn audio_append(pcm: &[u8]) -> Self {
        use base64::{engine::general_purpose::STANDARD, Engine};
        ClientEvent::InputAudioBufferAppend {
            audio: STANDARD.encode(pcm),
        }
    }

    /// `response.create` carrying explicit instructions.
    pub fn response_with_instructions(text: impl Into<String>) -> Self {
        ClientEvent::ResponseCreate {
            response: Some(ResponseInstructions {
                instructions: Some(text.into()),
            }),
        }
    }

    /// `conversation.item.create` with a plain assistant text message.
    pub fn assistant_message(text: impl Into<String>) -> Self {
        ClientEvent::ConversationItemCreate {
            item: ConversationItem::Message {
                role: MessageRole::Assistant,
                content: vec![MessageContent::OutputText { text: text.into() }],
            },
        }
    }

    /// `conversation.item.create` carrying a function-call output.
    pub fn function_call_output(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        ClientEvent::ConversationItemCreate {
            item: ConversationItem::FunctionCallOutput {
                call_id: call_id.into(),
                output: output.into(),
            },
        }
    }

    /// The wire `type` string for this event (logging, tests).
    pub fn event_type(&self) -> &'static str {
        match self {
            ClientEvent::SessionUpdate { .. } => "session.update",
            ClientEvent::InputAudioBufferAppend { .. } => "input_audio_buffer.append",
            ClientEvent::InputAudioBufferCommit => "input_audio_buffer.commit",
            ClientEvent::InputAudioBufferClear => "input_audio_buffer.clear",
            ClientEvent::ConversationItemCreate { .. } => "conversation.item.create",
            ClientEvent::ConversationItemTruncate { .. } => "conversation.item.truncate",
            ClientEvent::ResponseCreate { .. } => "response.create",
            ClientEvent::ResponseCancel => "response.cancel",
            ClientEvent::OutputAudioBufferClear => "output_audio_buffer.clear",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ConversationItem {
    #[serde(rename = "message")]
    Message {
        role: MessageRole,
        content: Vec<MessageContent>,
    },

    #[serde(rename = "function_call_output")]
    FunctionCallOutput { call_id: String, output: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    Assistant,
    User,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MessageContent {
    #[serde(rename = "output_text")]
    OutputText { text: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseInstructions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}
