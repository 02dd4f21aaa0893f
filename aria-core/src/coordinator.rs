//! SessionCoordinator — builds the components, owns the lifecycle.
//!
//! Construction is leaves-first: bus, then the outbound handle and response
//! context, then the message manager and audio layer, finally the state
//! machine and wake-word adapter on top. `run()` attaches the scheduler to
//! the bus, wires all subscriptions, starts the audio worker and wake-word
//! detection, and parks in a supervisory loop until `request_shutdown()`.
//!
//! The realtime connection itself is per-session: it opens when the state
//! machine starts a session (first wake word) and closes on return to Idle.

use std::any::Any;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use tracing::{error, info, warn};

use crate::audio::capture::CaptureStream;
use crate::audio::cues::{SoundCue, SoundCuePlayer};
use crate::audio::device::{AudioOutputDevice, MicrophoneSource};
use crate::audio::handler::SoundEventHandler;
use crate::audio::playback::StreamingPlayer;
use crate::config::{AssistantEnv, AssistantSettings};
use crate::error::Result;
use crate::events::bus::EventBus;
use crate::events::dispatcher::EventDispatcher;
use crate::events::VoiceAssistantEvent;
use crate::session::context::CurrentResponseContext;
use crate::session::manager::MessageManager;
use crate::session::mcp::RemoteToolHandler;
use crate::state::machine::{SessionControl, StateMachine};
use crate::tools::executor::ToolExecutor;
use crate::tools::registry::ToolRegistry;
use crate::tools::SpecialToolParameters;
use crate::transport::{realtime_url, Outbound, RealtimeTransport};
use crate::wake::{WakeWordAdapter, WakeWordDetector};

/// Owns the per-session realtime connection behind the `SessionControl`
/// seam the state machine drives.
pub struct SessionController {
    url: String,
    api_key: String,
    outbound: Outbound,
    manager: Arc<MessageManager>,
    dispatcher: Arc<EventDispatcher>,
    bus: Arc<EventBus>,
    transport: Mutex<Option<RealtimeTransport>>,
}

impl SessionController {
    fn new(
        url: String,
        api_key: String,
        outbound: Outbound,
        manager: Arc<MessageManager>,
        dispatcher: Arc<EventDispatcher>,
        bus: Arc<EventBus>,
    ) -> Arc<Self> {
        Arc::new(Self {
            url,
            api_key,
            outbound,
            manager,
            dispatcher,
            bus,
            transport: Mutex::new(None),
        })
    }
}

#[async_trait]
impl SessionControl for SessionController {
    async fn start_session(&self) -> std::result::Result<(), String> {
        if self.is_session_active() {
            warn!("Realtime session already active, skipping start");
            return Ok(());
        }

        info!("Starting realtime session...");
        let transport = RealtimeTransport::connect(
            &self.url,
            &self.api_key,
            self.dispatcher.clone(),
            self.bus.clone(),
            self.outbound.clone(),
        )
        .await
        .map_err(|e| e.to_string())?;

        // The session.update must land before any audio does
        self.manager
            .initialize_session()
            .map_err(|e| e.to_string())?;

        *self.transport.lock() = Some(transport);
        info!("Realtime session started");
        Ok(())
    }

    async fn end_session(&self) -> std::result::Result<(), String> {
        let transport = self.transport.lock().take();
        if let Some(transport) = transport {
            transport.close().await;
        }
        Ok(())
    }

    fn is_session_active(&self) -> bool {
        self.transport
            .lock()
            .as_ref()
            .map(|t| t.is_connected())
            .unwrap_or(false)
    }
}

pub struct SessionCoordinator {
    bus: Arc<EventBus>,
    settings: Arc<RwLock<AssistantSettings>>,
    registry: Arc<ToolRegistry>,
    context: Arc<CurrentResponseContext>,
    manager: Arc<MessageManager>,
    remote_tools: Arc<RemoteToolHandler>,
    executor: Arc<ToolExecutor>,
    player: Arc<StreamingPlayer>,
    cues: Arc<SoundCuePlayer>,
    sound_handler: Arc<SoundEventHandler>,
    capture: Arc<CaptureStream>,
    machine: Arc<StateMachine>,
    wake: Arc<WakeWordAdapter>,
    session: Arc<SessionController>,
    shutdown_signal: Notify,
    cleaned_up: AtomicBool,
}

impl SessionCoordinator {
    /// Build all components in dependency order, leaves first. Fails when
    /// the event-bus worker cannot be spawned.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        settings: AssistantSettings,
        env: AssistantEnv,
        registry: ToolRegistry,
        microphone: Arc<dyn MicrophoneSource>,
        output: Arc<dyn AudioOutputDevice>,
        detector: Arc<dyn WakeWordDetector>,
        sounds_dir: impl AsRef<Path>,
        user_context: Option<Arc<dyn Any + Send + Sync>>,
    ) -> Result<Arc<Self>> {
        let url = realtime_url(&settings.model.model);
        let tool_calling_model_name = settings.model.tool_calling_model_name.clone();
        let listening_timeout = settings.listening_timeout;

        let bus = Arc::new(EventBus::new()?);
        let settings = Arc::new(RwLock::new(settings));
        let registry = Arc::new(registry);
        let outbound = Outbound::new();

        let context = CurrentResponseContext::new();
        let manager = MessageManager::new(
            outbound.clone(),
            context.clone(),
            registry.clone(),
            settings.clone(),
        );
        let dispatcher = Arc::new(EventDispatcher::new(bus.clone()));
        let session = SessionController::new(
            url,
            env.api_key,
            outbound.clone(),
            manager.clone(),
            dispatcher,
            bus.clone(),
        );

        let player = StreamingPlayer::new(output.clone(), bus.clone());
        let cues = SoundCuePlayer::new(output, sounds_dir);
        let sound_handler = SoundEventHandler::new(player.clone(), cues.clone(), bus.clone());
        let capture = CaptureStream::new(microphone, outbound.clone());
        let remote_tools = RemoteToolHandler::new(outbound);

        let specials = Arc::new(SpecialToolParameters {
            audio_player: Some(player.clone()),
            event_bus: Some(bus.clone()),
            settings: Some(settings.clone()),
            tool_calling_model_name,
            user_context,
        });
        let executor = ToolExecutor::new(registry.clone(), manager.clone(), specials, bus.clone());

        let machine = StateMachine::new(
            session.clone() as Arc<dyn SessionControl>,
            capture.clone(),
            cues.clone(),
            bus.clone(),
            listening_timeout,
        );
        let wake = WakeWordAdapter::new(detector, bus.clone());

        Ok(Arc::new(Self {
            bus,
            settings,
            registry,
            context,
            manager,
            remote_tools,
            executor,
            player,
            cues,
            sound_handler,
            capture,
            machine,
            wake,
            session,
            shutdown_signal: Notify::new(),
            cleaned_up: AtomicBool::new(false),
        }))
    }

    pub fn bus(&self) -> Arc<EventBus> {
        self.bus.clone()
    }

    pub fn settings(&self) -> Arc<RwLock<AssistantSettings>> {
        self.settings.clone()
    }

    pub fn registry(&self) -> Arc<ToolRegistry> {
        self.registry.clone()
    }

    /// Start everything and park until shutdown is requested.
    pub async fn run(self: &Arc<Self>) -> Result<()> {
        self.bus.attach_runtime(tokio::runtime::Handle::current());

        // Subscription order is load-bearing: async handlers of one publish
        // run in subscription order, and the machine must observe
        // AssistantStartedToolCall (entering ToolCalling) before the
        // executor can finish the tool and publish the result.
        self.machine.subscribe(&self.bus);
        self.manager.subscribe(&self.bus);
        self.context.subscribe(&self.bus);
        self.player.subscribe(&self.bus);
        self.sound_handler.subscribe(&self.bus);
        self.executor.subscribe(&self.bus);
        self.remote_tools.subscribe(&self.bus);

        self.player.start()?;
        self.cues.play(SoundCue::Startup);
        self.wake
            .start_listening()
            .await
            .map_err(crate::error::AssistantError::Audio)?;

        info!("Voice assistant running (state: Idle, waiting for wake word)");
        self.shutdown_signal.notified().await;

        self.cleanup().await;
        Ok(())
    }

    /// Ask the supervisory loop to exit. Safe to call from anywhere.
    pub fn request_shutdown(&self) {
        self.shutdown_signal.notify_one();
    }

    /// Release everything exactly once: exit the current state (which ends
    /// any active session), stop wake-word detection, and drain playback
    /// concurrently; then cancel tool tasks and stop the capture loop and
    /// the bus.
    async fn cleanup(&self) {
        if self.cleaned_up.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Cleaning up all services...");

        let player = self.player.clone();
        let (state_result, wake_result, playback_result) = tokio::join!(
            async {
                self.machine
                    .handle_event(VoiceAssistantEvent::IdleTransition)
                    .await;
                self.machine.shutdown();
                Ok::<(), String>(())
            },
            self.wake.stop_listening(),
            // Joining the playback worker blocks, so it leaves the scheduler
            tokio::task::spawn_blocking(move || player.stop()),
        );
        self.executor.shutdown();

        if let Err(e) = state_result {
            error!("Error exiting state machine: {e}");
        }
        if let Err(e) = wake_result {
            error!("Error stopping wake word detection: {e}");
        }
        if let Err(e) = playback_result {
            error!("Error draining playback: {e}");
        }

        // Belt and braces: the Idle transition above already ends the
        // session, but a machine stuck mid-transition must not leak the
        // connection
        if let Err(e) = self.session.end_session().await {
            error!("Error closing realtime session: {e}");
        }

        self.capture.stop();
        self.bus.shutdown();
        info!("All services cleaned up");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::device::{AudioOutputDevice, MicrophoneSource};
    use crate::wake::WakeWordDetector;

    struct NullMic;

    impl MicrophoneSource for NullMic {
        fn start(&self) -> std::result::Result<(), String> {
            Ok(())
        }
        fn stop(&self) -> std::result::Result<(), String> {
            Ok(())
        }
        fn read_chunk(&self) -> std::result::Result<Option<Vec<u8>>, String> {
            Ok(None)
        }
        fn is_active(&self) -> bool {
            false
        }
    }

    struct NullDevice;

    impl AudioOutputDevice for NullDevice {
        fn write_chunk(&self, _samples: &[i16]) -> std::result::Result<(), String> {
            Ok(())
        }
        fn stop_all(&self) -> std::result::Result<(), String> {
            Ok(())
        }
        fn play_file(&self, _path: &Path) -> std::result::Result<(), String> {
            Ok(())
        }
    }

    struct NullDetector;

    #[async_trait]
    impl WakeWordDetector for NullDetector {
        async fn start(&self) -> std::result::Result<(), String> {
            Ok(())
        }
        async fn stop(&self) -> std::result::Result<(), String> {
            Ok(())
        }
        async fn wait_for_detection(&self) -> std::result::Result<bool, String> {
            Ok(false)
        }
    }

    fn test_env() -> AssistantEnv {
        AssistantEnv {
            api_key: "sk-test".to_string(),
            wake_word_access_key: "pv-test".to_string(),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_run_and_shutdown() {
        let coordinator = SessionCoordinator::new(
            AssistantSettings::default(),
            test_env(),
            ToolRegistry::new(),
            Arc::new(NullMic),
            Arc::new(NullDevice),
            Arc::new(NullDetector),
            "/nonexistent/sounds",
            None,
        )
        .unwrap();

        let runner = coordinator.clone();
        let handle = tokio::spawn(async move { runner.run().await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        coordinator.request_shutdown();

        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("shutdown timed out")
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_shutdown_is_idempotent() {
        let coordinator = SessionCoordinator::new(
            AssistantSettings::default(),
            test_env(),
            ToolRegistry::new(),
            Arc::new(NullMic),
            Arc::new(NullDevice),
            Arc::new(NullDetector),
            "/nonexistent/sounds",
            None,
        )
        .unwrap();

        let runner = coordinator.clone();
        let handle = tokio::spawn(async move { runner.run().await });
        tokio::time::sleep(Duration::from_millis(50)).await;

        coordinator.request_shutdown();
        coordinator.request_shutdown();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("shutdown timed out")
            .unwrap()
            .unwrap();

        // A second explicit cleanup is a no-op
        coordinator.cleanup().await;
    }
}
