//! SoundEventHandler — the bus bridge for all sound-related events.
//!
//! Feeds audio deltas into the playback queue, plays notification cues, and
//! implements the barge-in bridge: when the user starts speaking while the
//! assistant is audible, `AssistantSpeechInterrupted` is published BEFORE the
//! queue is cleared. The message manager depends on that ordering to truncate
//! with a still-valid item_id.

use std::sync::Arc;

use tracing::debug;

use crate::events::bus::{EventArg, EventBus, Handler};
use crate::events::{EventData, VoiceAssistantEvent};

use super::cues::{SoundCue, SoundCuePlayer};
use super::playback::StreamingPlayer;

pub struct SoundEventHandler {
    player: Arc<StreamingPlayer>,
    cues: Arc<SoundCuePlayer>,
    bus: Arc<EventBus>,
}

impl SoundEventHandler {
    pub fn new(
        player: Arc<StreamingPlayer>,
        cues: Arc<SoundCuePlayer>,
        bus: Arc<EventBus>,
    ) -> Arc<Self> {
        Arc::new(Self { player, cues, bus })
    }

    pub fn subscribe(self: &Arc<Self>, bus: &EventBus) {
        let handler = self.clone();
        bus.subscribe(
            VoiceAssistantEvent::AudioChunkReceived,
            Handler::sync1(move |arg| {
                if let EventArg::Data(EventData::Audio(delta)) = arg {
                    handler.player.add_chunk(&delta.delta);
                }
                Ok(())
            }),
        );

        let handler = self.clone();
        bus.subscribe(
            VoiceAssistantEvent::WakeWordDetected,
            Handler::sync0(move || {
                handler.cues.play(SoundCue::WakeWord);
                Ok(())
            }),
        );

        let handler = self.clone();
        bus.subscribe(
            VoiceAssistantEvent::IdleTransition,
            Handler::sync0(move || {
                handler.cues.play(SoundCue::ReturnToIdle);
                Ok(())
            }),
        );

        let handler = self.clone();
        bus.subscribe(
            VoiceAssistantEvent::UserStartedSpeaking,
            Handler::sync0(move || {
                handler.on_user_started_speaking();
                Ok(())
            }),
        );
    }

    /// Barge-in bridge. The interruption event goes out first so the
    /// truncation path still sees the latched item_id and elapsed time; only
    /// then is the queue cleared.
    fn on_user_started_speaking(&self) {
        if self.player.is_playing() {
            self.bus
                .publish_sync(VoiceAssistantEvent::AssistantSpeechInterrupted, None);
        }
        debug!("User started speaking, clearing audio queue");
        self.player.clear_queue_and_stop();
    }
}
