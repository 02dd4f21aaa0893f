//! Audio I/O layer.
//!
//! The concrete devices (microphone, speaker, sound-file player) are
//! external collaborators behind thin traits; this layer owns the capture
//! upload loop, the playback chunk queue, the cue player, and the bus bridge
//! that ties audio events to them.

pub mod capture;
pub mod cues;
pub mod device;
pub mod handler;
pub mod playback;

pub use capture::CaptureStream;
pub use cues::{SoundCue, SoundCuePlayer};
pub use device::{AudioOutputDevice, MicrophoneSource};
pub use handler::SoundEventHandler;
pub use playback::StreamingPlayer;
