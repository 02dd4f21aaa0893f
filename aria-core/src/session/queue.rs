//! PendingQueue — outbound messages held back during an active response.
//!
//! Sending a `conversation.item.create` or a fresh `response.create` while
//! the model is mid-response confuses it. The `response_active` flag flips on
//! `AssistantStartedResponse` / `AssistantCompletedResponse`; anything
//! submitted while it is set waits in FIFO order and drains right after the
//! response completes.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use crate::tools::FunctionCallResult;

#[derive(Debug, Clone)]
pub enum OutboundMessage {
    ToolResult(FunctionCallResult),
    GeneratorUpdate(String),
}

#[derive(Default)]
pub struct PendingQueue {
    response_active: AtomicBool,
    queue: Mutex<VecDeque<OutboundMessage>>,
    draining: AtomicBool,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_response_active(&self, active: bool) {
        self.response_active.store(active, Ordering::SeqCst);
    }

    pub fn is_response_active(&self) -> bool {
        self.response_active.load(Ordering::SeqCst)
    }

    /// Either hand the message back for immediate sending, or queue it.
    pub fn enqueue_or_pass(&self, message: OutboundMessage) -> Option<OutboundMessage> {
        if self.is_response_active() {
            debug!("Response active - queueing outbound message");
            self.queue.lock().push_back(message);
            None
        } else {
            Some(message)
        }
    }

    /// Next queued message, unless the queue is empty or a new response
    /// became active mid-drain.
    pub fn pop_for_drain(&self) -> Option<OutboundMessage> {
        if self.is_response_active() {
            return None;
        }
        self.queue.lock().pop_front()
    }

    /// Guard against overlapping drains. Returns false if a drain is already
    /// running.
    pub fn begin_drain(&self) -> bool {
        !self.draining.swap(true, Ordering::SeqCst)
    }

    pub fn end_drain(&self) {
        self.draining.store(false, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passes_through_when_idle() {
        let queue = PendingQueue::new();
        let passed = queue.enqueue_or_pass(OutboundMessage::GeneratorUpdate("A".into()));
        assert!(passed.is_some());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_queues_in_fifo_order_while_active() {
        let queue = PendingQueue::new();
        queue.set_response_active(true);

        assert!(queue
            .enqueue_or_pass(OutboundMessage::GeneratorUpdate("first".into()))
            .is_none());
        assert!(queue
            .enqueue_or_pass(OutboundMessage::GeneratorUpdate("second".into()))
            .is_none());
        assert_eq!(queue.len(), 2);

        // Nothing drains while the response is still active
        assert!(queue.pop_for_drain().is_none());

        queue.set_response_active(false);
        match queue.pop_for_drain() {
            Some(OutboundMessage::GeneratorUpdate(m)) => assert_eq!(m, "first"),
            other => panic!("unexpected message: {other:?}"),
        }
        match queue.pop_for_drain() {
            Some(OutboundMessage::GeneratorUpdate(m)) => assert_eq!(m, "second"),
            other => panic!("unexpected message: {other:?}"),
        }
        assert!(queue.pop_for_drain().is_none());
    }

    #[test]
    fn test_begin_drain_is_exclusive() {
        let queue = PendingQueue::new();
        assert!(queue.begin_drain());
        assert!(!queue.begin_drain());
        queue.end_drain();
        assert!(queue.begin_drain());
    }
}
