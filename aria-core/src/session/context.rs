//! CurrentResponseContext — item_id and timing for the in-flight response.
//!
//! Barge-in truncation needs two facts: which conversation item is playing
//! and how many milliseconds of it have been spoken. The item_id is latched
//! from the first audio delta of a response and never overwritten until the
//! response ends; the timer starts when the response starts.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::debug;

use crate::events::bus::{EventArg, EventBus, Handler};
use crate::events::{EventData, VoiceAssistantEvent};

#[derive(Default)]
struct Inner {
    item_id: Option<String>,
    started_at: Option<Instant>,
}

#[derive(Default)]
pub struct CurrentResponseContext {
    inner: Mutex<Inner>,
}

impl CurrentResponseContext {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Wire up the latching lifecycle. Clearing on interruption is the
    /// message manager's job (it reads the snapshot first), so only the
    /// start/latch/complete transitions live here.
    pub fn subscribe(self: &Arc<Self>, bus: &EventBus) {
        let ctx = self.clone();
        bus.subscribe(
            VoiceAssistantEvent::AssistantStartedResponse,
            Handler::sync0(move || {
                ctx.on_response_started();
                Ok(())
            }),
        );

        let ctx = self.clone();
        bus.subscribe(
            VoiceAssistantEvent::AudioChunkReceived,
            Handler::sync1(move |arg| {
                if let EventArg::Data(EventData::Audio(delta)) = arg {
                    ctx.latch_item_id(&delta.item_id);
                }
                Ok(())
            }),
        );

        let ctx = self.clone();
        bus.subscribe(
            VoiceAssistantEvent::AssistantCompletedResponse,
            Handler::sync0(move || {
                ctx.clear();
                Ok(())
            }),
        );
    }

    pub fn on_response_started(&self) {
        let mut inner = self.inner.lock();
        inner.started_at = Some(Instant::now());
        debug!("Assistant response started - timer started");
    }

    /// Latch the item id from the first audio delta of a response. Later
    /// deltas do not overwrite it.
    pub fn latch_item_id(&self, item_id: &str) {
        let mut inner = self.inner.lock();
        if inner.item_id.is_some() {
            return;
        }
        inner.item_id = Some(item_id.to_string());
        debug!("Latched response item_id: {item_id}");
    }

    pub fn item_id(&self) -> Option<String> {
        self.inner.lock().item_id.clone()
    }

    pub fn elapsed_ms(&self) -> Option<u64> {
        self.inner
            .lock()
            .started_at
            .map(|t| t.elapsed().as_millis() as u64)
    }

    /// Read item_id and elapsed time atomically, then clear both. Used by
    /// the truncation path so the context is reset exactly once per
    /// interruption.
    pub fn take_for_truncation(&self) -> (Option<String>, Option<u64>) {
        let mut inner = self.inner.lock();
        let item_id = inner.item_id.take();
        let elapsed = inner
            .started_at
            .take()
            .map(|t| t.elapsed().as_millis() as u64);
        (item_id, elapsed)
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.item_id = None;
        inner.started_at = None;
        debug!("Response context cleared");
    }
}
