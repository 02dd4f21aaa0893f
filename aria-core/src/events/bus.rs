//! EventBus — typed pub/sub with per-event subscriber lists.
//!
//! Two handler shapes, dispatched differently:
//! - Async handlers run on the primary tokio scheduler
//! - Sync handlers run on a small dedicated worker pool so they never block
//!   the cooperative world
//!
//! `publish_sync` may be called from any thread (audio callbacks, wake-word
//! threads); it schedules async handlers through the attached runtime handle.
//! `publish_async` is for callers already on the scheduler.
//!
//! Handler failures are logged and isolated — they never propagate back
//! through publish, and the remaining handlers still run.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, warn};

use crate::error::AssistantError;

use super::{EventData, VoiceAssistantEvent};

/// OS threads reserved for synchronous handlers. A single worker keeps sync
/// dispatch FIFO across publishes — the playback queue relies on audio
/// chunks being enqueued in arrival order.
const SYNC_WORKER_COUNT: usize = 1;

pub type SubscriptionId = u64;

type HandlerResult = Result<(), String>;
type BoxFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;

/// The single argument passed to an arity-1 handler: the payload when the
/// publish carried one, otherwise the event tag itself.
#[derive(Debug, Clone)]
pub enum EventArg {
    Event(VoiceAssistantEvent),
    Data(EventData),
}

enum HandlerFn {
    Sync0(Arc<dyn Fn() -> HandlerResult + Send + Sync>),
    Sync1(Arc<dyn Fn(EventArg) -> HandlerResult + Send + Sync>),
    Sync2(Arc<dyn Fn(VoiceAssistantEvent, Option<EventData>) -> HandlerResult + Send + Sync>),
    Async0(Arc<dyn Fn() -> BoxFuture + Send + Sync>),
    Async1(Arc<dyn Fn(EventArg) -> BoxFuture + Send + Sync>),
    Async2(Arc<dyn Fn(VoiceAssistantEvent, Option<EventData>) -> BoxFuture + Send + Sync>),
}

impl Clone for HandlerFn {
    fn clone(&self) -> Self {
        match self {
            HandlerFn::Sync0(f) => HandlerFn::Sync0(f.clone()),
            HandlerFn::Sync1(f) => HandlerFn::Sync1(f.clone()),
            HandlerFn::Sync2(f) => HandlerFn::Sync2(f.clone()),
            HandlerFn::Async0(f) => HandlerFn::Async0(f.clone()),
            HandlerFn::Async1(f) => HandlerFn::Async1(f.clone()),
            HandlerFn::Async2(f) => HandlerFn::Async2(f.clone()),
        }
    }
}

/// A registered handler: closure plus arity tag, chosen at registration.
/// Arity 0 is invoked with no arguments, arity 1 with the payload (or the
/// event tag when there is none), arity 2 with both.
#[derive(Clone)]
pub struct Handler {
    f: HandlerFn,
}

impl Handler {
    pub fn sync0(f: impl Fn() -> HandlerResult + Send + Sync + 'static) -> Self {
        Self {
            f: HandlerFn::Sync0(Arc::new(f)),
        }
    }

    pub fn sync1(f: impl Fn(EventArg) -> HandlerResult + Send + Sync + 'static) -> Self {
        Self {
            f: HandlerFn::Sync1(Arc::new(f)),
        }
    }

    pub fn sync2(
        f: impl Fn(VoiceAssistantEvent, Option<EventData>) -> HandlerResult + Send + Sync + 'static,
    ) -> Self {
        Self {
            f: HandlerFn::Sync2(Arc::new(f)),
        }
    }

    pub fn async0<Fut>(f: impl Fn() -> Fut + Send + Sync + 'static) -> Self
    where
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self {
            f: HandlerFn::Async0(Arc::new(move || Box::pin(f()) as BoxFuture)),
        }
    }

    pub fn async1<Fut>(f: impl Fn(EventArg) -> Fut + Send + Sync + 'static) -> Self
    where
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self {
            f: HandlerFn::Async1(Arc::new(move |arg| Box::pin(f(arg)) as BoxFuture)),
        }
    }

    pub fn async2<Fut>(
        f: impl Fn(VoiceAssistantEvent, Option<EventData>) -> Fut + Send + Sync + 'static,
    ) -> Self
    where
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self {
            f: HandlerFn::Async2(Arc::new(move |event, data| {
                Box::pin(f(event, data)) as BoxFuture
            })),
        }
    }

    fn is_async(&self) -> bool {
        matches!(
            self.f,
            HandlerFn::Async0(_) | HandlerFn::Async1(_) | HandlerFn::Async2(_)
        )
    }
}

#[derive(Clone)]
struct Subscription {
    id: SubscriptionId,
    handler: Handler,
}

type Job = Box<dyn FnOnce() + Send>;

/// Bounded pool of OS threads for sync handlers. One shared queue, so
/// invocation order follows enqueue order.
struct WorkerPool {
    tx: Mutex<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    fn new(worker_count: usize) -> Result<Self, AssistantError> {
        let (tx, rx) = mpsc::channel::<Job>();
        let rx = Arc::new(Mutex::new(rx));

        let mut workers = Vec::with_capacity(worker_count);
        for i in 0..worker_count {
            let rx = rx.clone();
            let worker = std::thread::Builder::new()
                .name(format!("event-bus-{i}"))
                .spawn(move || loop {
                    let job = {
                        let rx = rx.lock();
                        rx.recv()
                    };
                    match job {
                        Ok(job) => job(),
                        Err(_) => break,
                    }
                })
                .map_err(|e| {
                    AssistantError::Runtime(format!("failed to spawn event-bus worker: {e}"))
                })?;
            workers.push(worker);
        }

        Ok(Self {
            tx: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
        })
    }

    fn execute(&self, job: Job) {
        let tx = self.tx.lock();
        match tx.as_ref() {
            Some(tx) => {
                if tx.send(job).is_err() {
                    warn!("Event-bus worker pool is gone, dropping sync handler invocation");
                }
            }
            None => warn!("Event bus already shut down, dropping sync handler invocation"),
        }
    }

    /// Drop the sender and join the workers. Pending jobs drain first.
    fn shutdown(&self) {
        self.tx.lock().take();
        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        for worker in workers {
            let _ = worker.join();
        }
    }
}

pub struct EventBus {
    /// Subscribers per event tag, in subscription order
    subscribers: DashMap<VoiceAssistantEvent, Vec<Subscription>>,
    next_id: AtomicU64,
    /// Attached once during startup; needed so publish_sync can schedule
    /// async handlers from foreign threads
    runtime: RwLock<Option<tokio::runtime::Handle>>,
    pool: WorkerPool,
}

impl EventBus {
    /// Fails when the sync worker thread cannot be spawned.
    pub fn new() -> Result<Self, AssistantError> {
        Ok(Self {
            subscribers: DashMap::new(),
            next_id: AtomicU64::new(1),
            runtime: RwLock::new(None),
            pool: WorkerPool::new(SYNC_WORKER_COUNT)?,
        })
    }

    /// Register the scheduler handle (once during startup).
    pub fn attach_runtime(&self, handle: tokio::runtime::Handle) {
        *self.runtime.write() = Some(handle);
    }

    /// Subscribe a handler to an event. Handlers fire in subscription order.
    pub fn subscribe(&self, event: VoiceAssistantEvent, handler: Handler) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .entry(event)
            .or_default()
            .push(Subscription { id, handler });
        id
    }

    /// Remove a previously registered handler.
    pub fn unsubscribe(&self, event: VoiceAssistantEvent, id: SubscriptionId) {
        if let Some(mut subs) = self.subscribers.get_mut(&event) {
            subs.retain(|s| s.id != id);
        }
    }

    /// Number of subscribers for an event (tests, diagnostics).
    pub fn subscriber_count(&self, event: VoiceAssistantEvent) -> usize {
        self.subscribers.get(&event).map(|s| s.len()).unwrap_or(0)
    }

    /// Publish from any thread. Async handlers are scheduled onto the
    /// attached runtime (in subscription order within this publish); sync
    /// handlers go to the worker pool.
    pub fn publish_sync(&self, event: VoiceAssistantEvent, data: Option<EventData>) {
        let subs = self.snapshot(event);
        if subs.is_empty() {
            return;
        }

        let runtime = self.runtime.read().clone();
        let has_async = subs.iter().any(|s| s.handler.is_async());
        if has_async && runtime.is_none() {
            error!(
                "EventBus runtime not attached; dropping async handlers for {}. \
                 Call attach_runtime() during startup.",
                event
            );
        }

        let mut async_batch: Vec<Handler> = Vec::new();
        for sub in subs {
            if sub.handler.is_async() {
                async_batch.push(sub.handler);
            } else {
                let handler = sub.handler;
                let data = data.clone();
                self.pool.execute(Box::new(move || {
                    if let Err(e) = invoke_sync(&handler, event, data) {
                        error!("Error in sync handler for {}: {}", event, e);
                    }
                }));
            }
        }

        if let (Some(runtime), false) = (runtime, async_batch.is_empty()) {
            let data = data.clone();
            runtime.spawn(async move {
                for handler in async_batch {
                    if let Err(e) = invoke_async(&handler, event, data.clone()).await {
                        error!("Error in async handler for {}: {}", event, e);
                    }
                }
            });
        }
    }

    /// Publish from within the cooperative scheduler. Async handlers are
    /// awaited directly; sync handlers still run on the pool (and are awaited
    /// to completion).
    pub async fn publish_async(&self, event: VoiceAssistantEvent, data: Option<EventData>) {
        let subs = self.snapshot(event);

        for sub in subs {
            let handler = sub.handler;
            if handler.is_async() {
                if let Err(e) = invoke_async(&handler, event, data.clone()).await {
                    error!("Error in async handler for {}: {}", event, e);
                }
            } else {
                let (done_tx, done_rx) = tokio::sync::oneshot::channel();
                let data = data.clone();
                self.pool.execute(Box::new(move || {
                    if let Err(e) = invoke_sync(&handler, event, data) {
                        error!("Error in sync handler for {}: {}", event, e);
                    }
                    let _ = done_tx.send(());
                }));
                if done_rx.await.is_err() {
                    debug!("Sync handler for {} dropped before completion", event);
                }
            }
        }
    }

    /// Shut down the worker pool. Queued sync handlers drain first.
    pub fn shutdown(&self) {
        self.pool.shutdown();
    }

    fn snapshot(&self, event: VoiceAssistantEvent) -> Vec<Subscription> {
        self.subscribers
            .get(&event)
            .map(|s| s.value().clone())
            .unwrap_or_default()
    }
}

fn one_arg(event: VoiceAssistantEvent, data: Option<EventData>) -> EventArg {
    match data {
        Some(data) => EventArg::Data(data),
        None => EventArg::Event(event),
    }
}

fn invoke_sync(
    handler: &Handler,
    event: VoiceAssistantEvent,
    data: Option<EventData>,
) -> HandlerResult {
    match &handler.f {
        HandlerFn::Sync0(f) => f(),
        HandlerFn::Sync1(f) => f(one_arg(event, data)),
        HandlerFn::Sync2(f) => f(event, data),
        _ => unreachable!("async handler dispatched synchronously"),
    }
}

async fn invoke_async(
    handler: &Handler,
    event: VoiceAssistantEvent,
    data: Option<EventData>,
) -> HandlerResult {
    match &handler.f {
        HandlerFn::Async0(f) => f().await,
        HandlerFn::Async1(f) => f(one_arg(event, data)).await,
        HandlerFn::Async2(f) => f(event, data).await,
        _ => unreachable!("sync handler dispatched asynchronously"),
    }
}
