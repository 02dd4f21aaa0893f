//! CaptureStream — microphone upload loop.
//!
//! A cooperative loop reads fixed-size PCM16 chunks from the microphone and
//! hands them to the transport as base64-wrapped append events. The loop
//! pauses and resumes without closing the OS stream, so barge-in detection
//! keeps working while uploads are suspended.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::audio_constants::CAPTURE_POLL_MS;
use crate::transport::Outbound;

use super::device::MicrophoneSource;

pub struct CaptureStream {
    mic: Arc<dyn MicrophoneSource>,
    outbound: Outbound,
    paused: AtomicBool,
    running: AtomicBool,
    chunks_sent: AtomicU64,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl CaptureStream {
    pub fn new(mic: Arc<dyn MicrophoneSource>, outbound: Outbound) -> Arc<Self> {
        Arc::new(Self {
            mic,
            outbound,
            paused: AtomicBool::new(false),
            running: AtomicBool::new(false),
            chunks_sent: AtomicU64::new(0),
            task: Mutex::new(None),
        })
    }

    /// Start the microphone and the upload loop. Resumes if already running
    /// but paused.
    pub fn ensure_streaming(self: &Arc<Self>) -> Result<(), String> {
        if !self.mic.is_active() {
            self.mic.start()?;
            info!("Microphone stream started");
        }
        self.paused.store(false, Ordering::SeqCst);

        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let capture = self.clone();
        let handle = tokio::spawn(async move {
            info!("Starting audio transmission...");
            capture.upload_loop().await;
            debug!("Audio transmission loop finished");
        });
        *self.task.lock() = Some(handle);
        Ok(())
    }

    /// Suspend uploads without closing the OS stream.
    pub fn pause(&self) {
        if !self.paused.swap(true, Ordering::SeqCst) && self.running.load(Ordering::SeqCst) {
            info!("Audio streaming paused");
        }
    }

    pub fn resume(&self) {
        if self.paused.swap(false, Ordering::SeqCst) && self.running.load(Ordering::SeqCst) {
            info!("Audio streaming resumed");
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the loop and the microphone.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        if let Err(e) = self.mic.stop() {
            warn!("Error stopping microphone: {e}");
        }
        info!("Microphone capture stopped");
    }

    async fn upload_loop(&self) {
        while self.running.load(Ordering::SeqCst) {
            if self.paused.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(CAPTURE_POLL_MS)).await;
                continue;
            }

            match self.mic.read_chunk() {
                Ok(Some(chunk)) => {
                    if let Err(e) = self.outbound.send_audio_chunk(&chunk) {
                        warn!("Failed to send audio chunk: {e}");
                    } else {
                        let sent = self.chunks_sent.fetch_add(1, Ordering::Relaxed) + 1;
                        if sent % 100 == 0 {
                            debug!("Audio chunks sent: {sent}");
                        }
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    error!("Error reading microphone chunk: {e}");
                }
            }

            tokio::time::sleep(Duration::from_millis(CAPTURE_POLL_MS)).await;
        }
    }
}
