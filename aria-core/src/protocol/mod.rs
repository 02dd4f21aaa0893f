//! Wire protocol for the realtime API.
//!
//! Text frames over the duplex connection, each a JSON object with a `type`
//! string. Client events are what we emit; server events are what the
//! dispatcher validates and maps onto the internal bus.

pub mod client;
pub mod server;
pub mod session;

pub use client::{ClientEvent, ConversationItem, MessageContent, MessageRole, ResponseInstructions};
pub use server::{
    ApiErrorDetails, ApiErrorEvent, AssistantTranscriptEvent, AudioDeltaEvent, SessionCreatedEvent,
    TruncatedEvent, UserTranscriptEvent,
};
pub use session::{
    AudioConfig, AudioFormatConfig, AudioInputConfig, AudioOutputConfig, MaxOutputTokens,
    NoiseReductionConfig, SessionConfig, ToolDefinition, TranscriptionConfig, TurnDetectionConfig,
};
