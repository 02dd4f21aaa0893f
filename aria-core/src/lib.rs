//! aria-core — realtime voice-assistant session orchestrator.
//!
//! Mediates between a local audio environment (microphone, speaker,
//! wake-word detector) and a speech-capable model behind a bidirectional
//! streaming protocol. The crate owns the session state machine, the
//! streaming protocol client, the internal event bus, the dispatcher that
//! translates remote protocol events, the tool-call executor, and the
//! barge-in subsystem that truncates in-flight playback at byte-accurate
//! offsets.
//!
//! The concrete devices stay outside: implement [`audio::MicrophoneSource`],
//! [`audio::AudioOutputDevice`], and [`wake::WakeWordDetector`] for your
//! platform, register tools, then hand everything to
//! [`coordinator::SessionCoordinator`].

pub mod audio;
pub mod audio_constants;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod protocol;
pub mod session;
pub mod state;
pub mod tools;
pub mod transport;
pub mod wake;

pub use audio::{AudioOutputDevice, MicrophoneSource, SoundCue, StreamingPlayer};
pub use config::{AssistantEnv, AssistantSettings, AssistantVoice, VoiceSettings};
pub use coordinator::SessionCoordinator;
pub use error::{AssistantError, Result};
pub use events::bus::{EventBus, Handler};
pub use events::{EventData, VoiceAssistantEvent};
pub use state::AssistantState;
pub use tools::{
    FunctionCallItem, FunctionCallResult, ParamType, Tool, ToolOutput, ToolRegistry, ToolSchema,
};
pub use wake::WakeWordDetector;
