//! Sound-file cues — the four short notification sounds.
//!
//! Cues play through the device's file player, independent of the streaming
//! queue, so a wake chime never competes with response audio.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use super::device::AudioOutputDevice;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundCue {
    Startup,
    WakeWord,
    ReturnToIdle,
    Error,
}

impl SoundCue {
    pub fn file_name(&self) -> &'static str {
        match self {
            SoundCue::Startup => "startup.mp3",
            SoundCue::WakeWord => "wake_word.mp3",
            SoundCue::ReturnToIdle => "return_to_idle.mp3",
            SoundCue::Error => "error.mp3",
        }
    }
}

pub struct SoundCuePlayer {
    device: Arc<dyn AudioOutputDevice>,
    sounds_dir: PathBuf,
}

impl SoundCuePlayer {
    pub fn new(device: Arc<dyn AudioOutputDevice>, sounds_dir: impl AsRef<Path>) -> Arc<Self> {
        Arc::new(Self {
            device,
            sounds_dir: sounds_dir.as_ref().to_path_buf(),
        })
    }

    /// Play a cue non-blockingly. A missing asset or device failure is
    /// logged, never fatal.
    pub fn play(&self, cue: SoundCue) {
        let path = self.sounds_dir.join(cue.file_name());
        if !path.exists() {
            warn!("Sound file not found: {}", path.display());
            return;
        }
        debug!("Playing sound cue: {:?}", cue);
        if let Err(e) = self.device.play_file(&path) {
            warn!("Error playing {:?} cue: {e}", cue);
        }
    }
}
