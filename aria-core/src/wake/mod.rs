//! Wake-word adapter.
//!
//! The detection engine runs on its own native thread behind the
//! `WakeWordDetector` trait; the adapter turns detections into
//! `WakeWordDetected` bus events. It keeps listening during Responding so a
//! spoken wake word works as barge-in.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::events::bus::EventBus;
use crate::events::VoiceAssistantEvent;

/// The detection engine seam. Implementations wrap the native engine and
/// must be safe to call from the adapter's task.
#[async_trait]
pub trait WakeWordDetector: Send + Sync {
    async fn start(&self) -> Result<(), String>;

    async fn stop(&self) -> Result<(), String>;

    /// Block until the next detection. Ok(true) on detection, Ok(false)
    /// when the detector was stopped.
    async fn wait_for_detection(&self) -> Result<bool, String>;
}

pub struct WakeWordAdapter {
    detector: Arc<dyn WakeWordDetector>,
    bus: Arc<EventBus>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl WakeWordAdapter {
    pub fn new(detector: Arc<dyn WakeWordDetector>, bus: Arc<EventBus>) -> Arc<Self> {
        Arc::new(Self {
            detector,
            bus,
            task: Mutex::new(None),
        })
    }

    /// Start the detector and the publishing loop.
    pub async fn start_listening(self: &Arc<Self>) -> Result<(), String> {
        self.detector.start().await?;
        info!("Wake word detection started");

        let detector = self.detector.clone();
        let bus = self.bus.clone();
        let handle = tokio::spawn(async move {
            loop {
                match detector.wait_for_detection().await {
                    Ok(true) => {
                        info!("Wake word detected");
                        bus.publish_sync(VoiceAssistantEvent::WakeWordDetected, None);
                    }
                    Ok(false) => break,
                    Err(e) => {
                        error!("Wake word detection error: {e}");
                        break;
                    }
                }
            }
            info!("Wake word listening stopped");
        });
        *self.task.lock() = Some(handle);
        Ok(())
    }

    pub async fn stop_listening(&self) -> Result<(), String> {
        self.detector.stop().await?;
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        Ok(())
    }
}
