//! Transport — the duplex WebSocket connection to the realtime API.
//!
//! One connection per session, no reconnects within it. Writes funnel through
//! a single writer task fed by an unbounded channel, so outbound frames from
//! any one caller keep their call order. The receive pump parses each text
//! frame as JSON and hands it to the dispatcher; malformed frames are logged
//! and discarded.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::connect_async;
use tracing::{debug, error, info, warn};

use crate::audio_constants::CONNECT_TIMEOUT_SECS;
use crate::error::{AssistantError, Result};
use crate::events::bus::EventBus;
use crate::events::{EventData, VoiceAssistantEvent};
use crate::events::dispatcher::EventDispatcher;
use crate::protocol::client::ClientEvent;

/// Build the realtime endpoint URL for a model.
pub fn realtime_url(model: &str) -> String {
    format!("wss://api.openai.com/v1/realtime?model={model}")
}

/// Cloneable sending side of the connection. Everything outbound — session
/// updates, tool results, audio chunks — goes through here.
///
/// The handle outlives individual connections: components hold it for the
/// process lifetime, while each realtime session attaches its own writer
/// channel on connect and detaches on close. Sends while detached fail with
/// a transport error, mirroring the no-connection case.
#[derive(Clone, Default)]
pub struct Outbound {
    tx: Arc<parking_lot::RwLock<Option<mpsc::UnboundedSender<ClientEvent>>>>,
}

impl Outbound {
    /// A detached handle. Sends fail until a connection attaches.
    pub fn new() -> Self {
        Self::default()
    }

    /// An attached handle plus the receiving end the writer task (or a test
    /// harness) drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let outbound = Self::new();
        let rx = outbound.attach();
        (outbound, rx)
    }

    /// Attach a fresh writer channel for a new connection, returning its
    /// receiving end. Any previous channel is dropped.
    pub fn attach(&self) -> mpsc::UnboundedReceiver<ClientEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.tx.write() = Some(tx);
        rx
    }

    pub fn detach(&self) {
        *self.tx.write() = None;
    }

    /// Queue a JSON event for transmission.
    pub fn send(&self, event: ClientEvent) -> Result<()> {
        let guard = self.tx.read();
        let tx = guard
            .as_ref()
            .ok_or_else(|| AssistantError::Transport("no connection available".to_string()))?;
        tx.send(event)
            .map_err(|_| AssistantError::Transport("connection closed".to_string()))
    }

    /// Queue raw PCM16 bytes, base64-wrapped in the append envelope.
    pub fn send_audio_chunk(&self, pcm: &[u8]) -> Result<()> {
        self.send(ClientEvent::audio_append(pcm))
    }

    pub fn is_open(&self) -> bool {
        self.tx
            .read()
            .as_ref()
            .map(|tx| !tx.is_closed())
            .unwrap_or(false)
    }
}

pub struct RealtimeTransport {
    outbound: Outbound,
    connected: Arc<AtomicBool>,
    close_notify: Arc<Notify>,
    writer_handle: JoinHandle<()>,
    pump_handle: JoinHandle<()>,
}

impl RealtimeTransport {
    /// Open the connection and start the writer task and receive pump. The
    /// supplied `Outbound` handle is attached to the new connection.
    /// Establishment must succeed within the 10 s bound; failure is published
    /// as `ErrorOccurred` and returned.
    pub async fn connect(
        url: &str,
        api_key: &str,
        dispatcher: Arc<EventDispatcher>,
        bus: Arc<EventBus>,
        outbound: Outbound,
    ) -> Result<Self> {
        let mut request = url
            .into_client_request()
            .map_err(|e| AssistantError::Transport(format!("invalid url: {e}")))?;
        request.headers_mut().insert(
            "Authorization",
            format!("Bearer {api_key}")
                .parse()
                .map_err(|_| AssistantError::Transport("invalid api key header".to_string()))?,
        );

        info!("Establishing realtime connection to {url}...");
        let connect = tokio::time::timeout(
            Duration::from_secs(CONNECT_TIMEOUT_SECS),
            connect_async(request),
        )
        .await;

        let ws_stream = match connect {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(e)) => {
                let err = AssistantError::Transport(format!("connection failed: {e}"));
                bus.publish_sync(
                    VoiceAssistantEvent::ErrorOccurred,
                    Some(EventData::Json(serde_json::json!({"error": e.to_string()}))),
                );
                return Err(err);
            }
            Err(_) => {
                let err = AssistantError::Transport(format!(
                    "connection not established within {CONNECT_TIMEOUT_SECS}s"
                ));
                bus.publish_sync(
                    VoiceAssistantEvent::ErrorOccurred,
                    Some(EventData::Json(
                        serde_json::json!({"error": "connect timeout"}),
                    )),
                );
                return Err(err);
            }
        };
        info!("Realtime connection established");

        let (mut sink, mut stream) = ws_stream.split();
        let mut outbound_rx = outbound.attach();
        let connected = Arc::new(AtomicBool::new(true));
        let close_notify = Arc::new(Notify::new());

        // Writer task — the single writer path to the socket
        let writer_connected = connected.clone();
        let writer_close = close_notify.clone();
        let writer_bus = bus.clone();
        let writer_handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = outbound_rx.recv() => {
                        let Some(event) = event else { break };
                        let text = match serde_json::to_string(&event) {
                            Ok(text) => text,
                            Err(e) => {
                                error!("Failed to serialize {}: {e}", event.event_type());
                                continue;
                            }
                        };
                        if let Err(e) = sink.send(Message::Text(text)).await {
                            error!("WebSocket send failed: {e}");
                            writer_connected.store(false, Ordering::SeqCst);
                            writer_bus.publish_sync(
                                VoiceAssistantEvent::ErrorOccurred,
                                Some(EventData::Json(serde_json::json!({"error": e.to_string()}))),
                            );
                            break;
                        }
                    }
                    _ = writer_close.notified() => {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
            writer_connected.store(false, Ordering::SeqCst);
            debug!("Writer task finished");
        });

        // Receive pump — parses frames and hands them to the dispatcher
        let pump_connected = connected.clone();
        let pump_bus = bus.clone();
        let pump_handle = tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                match message {
                    Ok(Message::Text(text)) => match serde_json::from_str::<serde_json::Value>(&text)
                    {
                        Ok(frame) => dispatcher.dispatch(frame),
                        Err(e) => warn!("Received malformed JSON frame: {e}"),
                    },
                    Ok(Message::Close(frame)) => {
                        info!("Connection closed by remote: {frame:?}");
                        break;
                    }
                    // Ping/pong are answered by the library
                    Ok(_) => {}
                    Err(e) => {
                        error!("WebSocket receive error: {e}");
                        if pump_connected.load(Ordering::SeqCst) {
                            pump_bus.publish_sync(
                                VoiceAssistantEvent::ErrorOccurred,
                                Some(EventData::Json(serde_json::json!({"error": e.to_string()}))),
                            );
                        }
                        break;
                    }
                }
            }
            pump_connected.store(false, Ordering::SeqCst);
            debug!("Receive pump finished");
        });

        Ok(Self {
            outbound,
            connected,
            close_notify,
            writer_handle,
            pump_handle,
        })
    }

    pub fn outbound(&self) -> Outbound {
        self.outbound.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Close the connection. The outbound handle detaches, the writer
    /// flushes a close frame, and the receive pump terminates once the
    /// stream ends (aborted if the remote never acknowledges).
    pub async fn close(self) {
        info!("Closing realtime connection...");
        self.connected.store(false, Ordering::SeqCst);
        self.outbound.detach();
        self.close_notify.notify_one();

        if self.writer_handle.await.is_err() {
            warn!("Writer task ended abnormally");
        }

        // Give the remote a moment to acknowledge, then stop the pump
        let mut pump = self.pump_handle;
        if tokio::time::timeout(Duration::from_secs(1), &mut pump)
            .await
            .is_err()
        {
            debug!("Receive pump did not finish in time, aborting");
            pump.abort();
        }
        info!("Connection closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_realtime_url() {
        assert_eq!(
            realtime_url("gpt-realtime"),
            "wss://api.openai.com/v1/realtime?model=gpt-realtime"
        );
    }

    #[tokio::test]
    async fn test_outbound_preserves_call_order() {
        let (outbound, mut rx) = Outbound::channel();
        assert_ok!(outbound.send(ClientEvent::InputAudioBufferCommit));
        assert_ok!(outbound.send(ClientEvent::InputAudioBufferClear));
        assert_ok!(outbound.send(ClientEvent::response_with_instructions("hi")));

        assert_eq!(rx.recv().await.unwrap(), ClientEvent::InputAudioBufferCommit);
        assert_eq!(rx.recv().await.unwrap(), ClientEvent::InputAudioBufferClear);
        assert!(matches!(
            rx.recv().await.unwrap(),
            ClientEvent::ResponseCreate { .. }
        ));
    }

    #[tokio::test]
    async fn test_audio_chunk_is_base64_wrapped() {
        let (outbound, mut rx) = Outbound::channel();
        outbound.send_audio_chunk(&[1u8, 2, 3, 4]).unwrap();
        match rx.recv().await.unwrap() {
            ClientEvent::InputAudioBufferAppend { audio } => assert_eq!(audio, "AQIDBA=="),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_send_after_close_is_transport_error() {
        let (outbound, rx) = Outbound::channel();
        drop(rx);
        assert!(!outbound.is_open());
        let err = assert_err!(outbound.send(ClientEvent::ResponseCancel));
        assert!(matches!(err, AssistantError::Transport(_)));
    }

    #[tokio::test]
    async fn test_detached_handle_rejects_sends_until_attached() {
        let outbound = Outbound::new();
        assert!(!outbound.is_open());
        assert_err!(outbound.send(ClientEvent::ResponseCancel));

        let mut rx = outbound.attach();
        assert_ok!(outbound.send(ClientEvent::ResponseCancel));
        assert_eq!(rx.recv().await.unwrap(), ClientEvent::ResponseCancel);

        outbound.detach();
        assert_err!(outbound.send(ClientEvent::ResponseCancel));
    }
}
