//! StateMachine — event-driven transitions between lifecycle states.
//!
//! Each transition runs the outgoing state's exit hook, then the incoming
//! state's entry hook. `IdleTransition` is handled centrally (any state can
//! be sent home); everything else goes through the per-state tables.
//!
//! The machine holds no references to other components except through the
//! bus and the `SessionControl` seam, so the collaborator cycle
//! (state ↔ coordinator ↔ bus) stays broken.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::audio::capture::CaptureStream;
use crate::audio::cues::{SoundCue, SoundCuePlayer};
use crate::events::bus::{EventBus, Handler};
use crate::events::VoiceAssistantEvent;

use super::AssistantState;

/// Session lifecycle seam, implemented by the coordinator. Keeps the machine
/// free of transport details.
#[async_trait]
pub trait SessionControl: Send + Sync {
    async fn start_session(&self) -> Result<(), String>;
    async fn end_session(&self) -> Result<(), String>;
    fn is_session_active(&self) -> bool;
}

pub struct StateMachine {
    state: tokio::sync::Mutex<AssistantState>,
    session: Arc<dyn SessionControl>,
    capture: Arc<CaptureStream>,
    cues: Arc<SoundCuePlayer>,
    bus: Arc<EventBus>,
    /// User-silence bound while listening (and error-state dwell time)
    timeout: Duration,
    timeout_task: Mutex<Option<JoinHandle<()>>>,
}

impl StateMachine {
    pub fn new(
        session: Arc<dyn SessionControl>,
        capture: Arc<CaptureStream>,
        cues: Arc<SoundCuePlayer>,
        bus: Arc<EventBus>,
        timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: tokio::sync::Mutex::new(AssistantState::Idle),
            session,
            capture,
            cues,
            bus,
            timeout,
            timeout_task: Mutex::new(None),
        })
    }

    /// Route every bus event into the machine.
    pub fn subscribe(self: &Arc<Self>, bus: &EventBus) {
        let machine = self.clone();
        for event in [
            VoiceAssistantEvent::WakeWordDetected,
            VoiceAssistantEvent::UserSpeechEnded,
            VoiceAssistantEvent::AssistantCompletedResponse,
            VoiceAssistantEvent::AssistantSpeechInterrupted,
            VoiceAssistantEvent::AssistantStartedToolCall,
            VoiceAssistantEvent::AssistantReceivedToolCallResult,
            VoiceAssistantEvent::IdleTransition,
            VoiceAssistantEvent::TimeoutOccurred,
            VoiceAssistantEvent::ErrorOccurred,
        ] {
            let machine = machine.clone();
            bus.subscribe(
                event,
                Handler::async2(move |event, _data| {
                    let machine = machine.clone();
                    async move {
                        machine.handle_event(event).await;
                        Ok(())
                    }
                }),
            );
        }
    }

    pub async fn current_state(&self) -> AssistantState {
        *self.state.lock().await
    }

    pub async fn handle_event(&self, event: VoiceAssistantEvent) {
        let mut state = self.state.lock().await;
        let current = *state;

        // Any state can be sent home
        if event == VoiceAssistantEvent::IdleTransition {
            if current != AssistantState::Idle {
                info!("Idle transition requested in {current} state");
                self.transition(&mut state, AssistantState::Idle).await;
            }
            return;
        }

        let next = match current {
            AssistantState::Idle => match event {
                VoiceAssistantEvent::WakeWordDetected => Some(AssistantState::Listening),
                _ => None,
            },
            AssistantState::Listening => match event {
                VoiceAssistantEvent::UserSpeechEnded => Some(AssistantState::Responding),
                VoiceAssistantEvent::TimeoutOccurred => Some(AssistantState::Idle),
                VoiceAssistantEvent::ErrorOccurred => Some(AssistantState::Error),
                _ => None,
            },
            AssistantState::Responding => match event {
                VoiceAssistantEvent::AssistantCompletedResponse => Some(AssistantState::Listening),
                VoiceAssistantEvent::AssistantSpeechInterrupted => Some(AssistantState::Listening),
                VoiceAssistantEvent::WakeWordDetected => Some(AssistantState::Listening),
                VoiceAssistantEvent::AssistantStartedToolCall => Some(AssistantState::ToolCalling),
                VoiceAssistantEvent::ErrorOccurred => Some(AssistantState::Error),
                _ => None,
            },
            AssistantState::ToolCalling => match event {
                VoiceAssistantEvent::AssistantReceivedToolCallResult => {
                    Some(AssistantState::Responding)
                }
                VoiceAssistantEvent::ErrorOccurred => Some(AssistantState::Error),
                _ => None,
            },
            AssistantState::Error => match event {
                VoiceAssistantEvent::TimeoutOccurred => Some(AssistantState::Idle),
                VoiceAssistantEvent::AssistantCompletedResponse => Some(AssistantState::Idle),
                _ => None,
            },
        };

        match next {
            Some(next) => self.transition(&mut state, next).await,
            None => debug!("Ignoring event {event} in {current} state"),
        }
    }

    async fn transition(&self, state: &mut AssistantState, next: AssistantState) {
        let current = *state;
        info!("Transitioning from {current} to {next}");
        self.on_exit(current).await;
        *state = next;
        self.on_enter(next).await;
    }

    async fn on_enter(&self, state: AssistantState) {
        match state {
            AssistantState::Idle => {
                info!("Entering Idle state - waiting for wake word");
                self.capture.pause();
                if let Err(e) = self.session.end_session().await {
                    error!("Error ending session: {e}");
                }
            }
            AssistantState::Listening => {
                info!("Entering Listening state - ready for user input");
                if !self.session.is_session_active() {
                    if let Err(e) = self.session.start_session().await {
                        error!("Failed to start realtime session: {e}");
                        // Scheduled, not awaited inline: the machine handles
                        // ErrorOccurred itself and the state lock is held here
                        self.bus
                            .publish_sync(VoiceAssistantEvent::ErrorOccurred, None);
                        return;
                    }
                }
                if let Err(e) = self.capture.ensure_streaming() {
                    error!("Failed to start microphone streaming: {e}");
                    self.bus
                        .publish_sync(VoiceAssistantEvent::ErrorOccurred, None);
                    return;
                }
                self.arm_timeout();
            }
            AssistantState::Responding => {
                info!("Entering Responding state - delivering response");
                // Wake-word detection stays active for barge-in; only the
                // upload path to the remote pauses
                self.capture.pause();
            }
            AssistantState::ToolCalling => {
                info!("Entering ToolCalling state");
            }
            AssistantState::Error => {
                error!("Entering Error state");
                self.cues.play(SoundCue::Error);
                self.arm_timeout();
            }
        }
    }

    async fn on_exit(&self, state: AssistantState) {
        match state {
            AssistantState::Listening | AssistantState::Error => self.cancel_timeout(),
            _ => {}
        }
    }

    /// Arm the inactivity timer. Fires `TimeoutOccurred` unless the state is
    /// exited first.
    fn arm_timeout(&self) {
        self.cancel_timeout();
        let bus = self.bus.clone();
        let timeout = self.timeout;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            info!("Inactivity timeout after {:?}", timeout);
            bus.publish_sync(VoiceAssistantEvent::TimeoutOccurred, None);
        });
        *self.timeout_task.lock() = Some(handle);
    }

    fn cancel_timeout(&self) {
        if let Some(task) = self.timeout_task.lock().take() {
            task.abort();
        }
    }

    /// Cancel pending timers on shutdown.
    pub fn shutdown(&self) {
        self.cancel_timeout();
    }
}
