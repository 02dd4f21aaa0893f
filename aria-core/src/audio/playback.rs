//! StreamingPlayer — the playback FIFO and its worker thread.
//!
//! Incoming audio deltas are base64-decoded and queued; one dedicated OS
//! thread writes them to the output device in order. Volume scaling happens
//! in the int16 domain. Start/stop transitions are debounced by a minimum
//! interval so tiny audio bursts separated by silence don't flap the state.
//!
//! The protocol-derived `response.created` / `response.done` signals are
//! authoritative; playback start is logged only, and drain to empty
//! publishes `AssistantCompletedResponse` (debounced) purely as a fallback
//! for episodes the protocol never completed.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use base64::{engine::general_purpose::STANDARD, Engine};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, warn};

use crate::audio_constants::PLAYBACK_DEBOUNCE_MS;
use crate::error::{AssistantError, Result};
use crate::events::bus::EventBus;
use crate::events::VoiceAssistantEvent;

use super::device::AudioOutputDevice;

/// How long the worker sleeps on an empty queue before re-checking
const POLL_TIMEOUT: Duration = Duration::from_millis(100);

struct PlayState {
    is_busy: bool,
    last_transition: Instant,
    /// Whether the current playback episode was already completed by the
    /// protocol (`response.done`). Drain only publishes when it wasn't, so
    /// each response cycle completes exactly once.
    settled: bool,
}

pub struct StreamingPlayer {
    device: Arc<dyn AudioOutputDevice>,
    bus: Arc<EventBus>,
    queue: Mutex<VecDeque<Vec<i16>>>,
    queue_signal: Condvar,
    state: Mutex<PlayState>,
    /// Volume in [0.0, 1.0], stored as f32 bits
    volume: AtomicU32,
    running: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
    debounce: Duration,
}

impl StreamingPlayer {
    pub fn new(device: Arc<dyn AudioOutputDevice>, bus: Arc<EventBus>) -> Arc<Self> {
        Arc::new(Self {
            device,
            bus,
            queue: Mutex::new(VecDeque::new()),
            queue_signal: Condvar::new(),
            state: Mutex::new(PlayState {
                is_busy: false,
                last_transition: Instant::now() - Duration::from_millis(PLAYBACK_DEBOUNCE_MS),
                settled: true,
            }),
            volume: AtomicU32::new(1.0f32.to_bits()),
            running: AtomicBool::new(false),
            worker: Mutex::new(None),
            debounce: Duration::from_millis(PLAYBACK_DEBOUNCE_MS),
        })
    }

    /// Mark the current playback episode as settled when the protocol
    /// completes the response, so drain doesn't publish a duplicate.
    pub fn subscribe(self: &Arc<Self>, bus: &EventBus) {
        let player = self.clone();
        bus.subscribe(
            VoiceAssistantEvent::AssistantCompletedResponse,
            crate::events::bus::Handler::sync0(move || {
                player.state.lock().settled = true;
                Ok(())
            }),
        );
    }

    /// Start the worker thread that owns the output device.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Playback worker already running");
            return Ok(());
        }
        let player = self.clone();
        let handle = std::thread::Builder::new()
            .name("playback".to_string())
            .spawn(move || player.worker_loop())
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                AssistantError::Audio(format!("failed to spawn playback worker: {e}"))
            })?;
        *self.worker.lock() = Some(handle);
        info!("Playback worker started");
        Ok(())
    }

    /// Stop the worker and join it. Remaining queued chunks are dropped.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.queue_signal.notify_all();
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
        self.queue.lock().clear();
        info!("Playback worker stopped");
    }

    /// Queue one base64-encoded PCM16 chunk from an audio delta.
    pub fn add_chunk(&self, base64_audio: &str) {
        let bytes = match STANDARD.decode(base64_audio) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("Error decoding audio chunk: {e}");
                return;
            }
        };
        if bytes.len() % 2 != 0 {
            warn!("Dropping audio chunk with odd byte count ({})", bytes.len());
            return;
        }
        let samples: Vec<i16> = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();

        let mut queue = self.queue.lock();
        queue.push_back(samples);
        debug!("Queued audio chunk (queue depth: {})", queue.len());
        drop(queue);
        self.queue_signal.notify_one();
    }

    /// Empty the queue and restart the device's active stream so
    /// already-buffered hardware samples are dropped. Publishing the
    /// interruption event happens upstream, before this is called.
    pub fn clear_queue_and_stop(&self) {
        info!("Clearing audio queue and stopping current playback");
        self.queue.lock().clear();
        if let Err(e) = self.device.stop_all() {
            error!("Error restarting audio stream: {e}");
        }
        let mut state = self.state.lock();
        if state.is_busy {
            state.is_busy = false;
            state.last_transition = Instant::now();
        }
        state.settled = true;
    }

    pub fn is_playing(&self) -> bool {
        self.state.lock().is_busy
    }

    pub fn queue_len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn set_volume(&self, volume: f32) {
        let clamped = volume.clamp(0.0, 1.0);
        self.volume.store(clamped.to_bits(), Ordering::SeqCst);
        info!("Playback volume set to {clamped:.2}");
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume.load(Ordering::SeqCst))
    }

    fn worker_loop(self: Arc<Self>) {
        while self.running.load(Ordering::SeqCst) {
            let chunk = {
                let mut queue = self.queue.lock();
                if queue.is_empty() {
                    self.queue_signal.wait_for(&mut queue, POLL_TIMEOUT);
                }
                queue.pop_front()
            };

            match chunk {
                Some(chunk) => {
                    self.mark_busy();
                    let scaled = self.apply_volume(&chunk);
                    if let Err(e) = self.device.write_chunk(&scaled) {
                        error!("Stream write error: {e}");
                    }
                    self.check_drained();
                }
                None => self.check_drained(),
            }
        }
    }

    fn mark_busy(&self) {
        let mut state = self.state.lock();
        let was_busy = state.is_busy;
        state.is_busy = true;
        if !was_busy {
            // A fresh episode; a protocol completion has yet to arrive
            state.settled = false;
            if state.last_transition.elapsed() >= self.debounce {
                state.last_transition = Instant::now();
                // Informational only: response.created is the authoritative
                // started signal
                debug!("Playback started after idle");
            }
        }
    }

    /// Queue empty while busy, past the debounce window, means the response
    /// finished playing. Publishes completion only as a fallback — when the
    /// protocol's response.done never settled this episode.
    fn check_drained(&self) {
        if !self.queue.lock().is_empty() {
            return;
        }
        let mut state = self.state.lock();
        if state.is_busy && state.last_transition.elapsed() >= self.debounce {
            state.is_busy = false;
            state.last_transition = Instant::now();
            let settled = state.settled;
            state.settled = true;
            drop(state);
            debug!("Playback queue drained");
            if !settled {
                self.bus
                    .publish_sync(VoiceAssistantEvent::AssistantCompletedResponse, None);
            }
        }
    }

    fn apply_volume(&self, samples: &[i16]) -> Vec<i16> {
        let volume = self.volume();
        if (volume - 1.0).abs() < f32::EPSILON {
            return samples.to_vec();
        }
        samples
            .iter()
            .map(|&s| (s as f32 * volume) as i16)
            .collect()
    }
}

impl Drop for StreamingPlayer {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.queue_signal.notify_all();
    }
}
