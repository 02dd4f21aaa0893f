//! Crate-wide error type.
//!
//! Configuration errors are fatal at startup; everything else is surfaced to
//! the event bus as `ErrorOccurred` or logged and contained, per component.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssistantError {
    /// Required credential missing from the environment
    #[error("missing credential: {0}")]
    MissingCredential(&'static str),

    /// Invalid configuration value (bad language code, etc.)
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Connection establishment, send, or close failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Inbound frame failed validation or serialization failed
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Tool lookup, parameter injection, or handler failure
    #[error("tool error: {0}")]
    Tool(String),

    /// Audio device or playback failure
    #[error("audio error: {0}")]
    Audio(String),

    /// Worker thread or scheduler resource could not be acquired
    #[error("runtime error: {0}")]
    Runtime(String),
}

impl From<serde_json::Error> for AssistantError {
    fn from(e: serde_json::Error) -> Self {
        AssistantError::Protocol(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AssistantError>;
