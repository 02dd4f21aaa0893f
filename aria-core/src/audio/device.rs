//! Device traits — the seams to the platform audio backends.
//!
//! Implementations wrap whatever the platform provides (PortAudio, ALSA, a
//! test double). Both sides speak PCM16 mono at the rate fixed in
//! `audio_constants`.

use std::path::Path;

/// Playback device. Owned by the single playback worker; all other
/// components enqueue into the playback FIFO instead of touching this.
pub trait AudioOutputDevice: Send + Sync {
    /// Write one chunk of samples. Blocking; called only from the playback
    /// worker thread.
    fn write_chunk(&self, samples: &[i16]) -> Result<(), String>;

    /// Drop already-buffered hardware samples by restarting the active
    /// stream. Used on barge-in so the user does not keep hearing stale
    /// audio.
    fn stop_all(&self) -> Result<(), String>;

    /// Play a short local sound file without blocking and without touching
    /// the streaming queue.
    fn play_file(&self, path: &Path) -> Result<(), String>;
}

/// Microphone capture. The upload loop pauses and resumes without closing
/// the OS stream.
pub trait MicrophoneSource: Send + Sync {
    fn start(&self) -> Result<(), String>;

    fn stop(&self) -> Result<(), String>;

    /// One PCM16 chunk, or None when no data is ready yet.
    fn read_chunk(&self) -> Result<Option<Vec<u8>>, String>;

    fn is_active(&self) -> bool;
}
