//! End-to-end session flows: wire frames in through the dispatcher, observe
//! outbound client events, playback writes, and state transitions.
//!
//! The remote side is scripted JSON frames; the devices are in-memory fakes.
//! Only the WebSocket itself is absent — everything else is the real wiring.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use tokio::sync::mpsc;

use aria_core::audio::capture::CaptureStream;
use aria_core::audio::cues::SoundCuePlayer;
use aria_core::audio::device::{AudioOutputDevice, MicrophoneSource};
use aria_core::audio::handler::SoundEventHandler;
use aria_core::audio::playback::StreamingPlayer;
use aria_core::config::AssistantSettings;
use aria_core::events::bus::{EventBus, Handler};
use aria_core::events::dispatcher::EventDispatcher;
use aria_core::events::VoiceAssistantEvent;
use aria_core::protocol::client::ClientEvent;
use aria_core::session::{CurrentResponseContext, MessageManager};
use aria_core::state::machine::{SessionControl, StateMachine};
use aria_core::state::AssistantState;
use aria_core::tools::{
    ChunkStream, ParamType, Tool, ToolExecutor, ToolOutput, ToolRegistry, ToolSchema,
    SpecialToolParameters,
};
use aria_core::transport::Outbound;

#[derive(Default)]
struct FakeOutput {
    written: Mutex<Vec<Vec<i16>>>,
    stops: AtomicUsize,
}

impl AudioOutputDevice for FakeOutput {
    fn write_chunk(&self, samples: &[i16]) -> Result<(), String> {
        self.written.lock().push(samples.to_vec());
        Ok(())
    }

    fn stop_all(&self) -> Result<(), String> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn play_file(&self, _path: &Path) -> Result<(), String> {
        Ok(())
    }
}

struct SilentMic(AtomicBool);

impl MicrophoneSource for SilentMic {
    fn start(&self) -> Result<(), String> {
        self.0.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> Result<(), String> {
        self.0.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn read_chunk(&self) -> Result<Option<Vec<u8>>, String> {
        Ok(None)
    }

    fn is_active(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

struct FakeSession(AtomicBool);

#[async_trait]
impl SessionControl for FakeSession {
    async fn start_session(&self) -> Result<(), String> {
        self.0.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn end_session(&self) -> Result<(), String> {
        self.0.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_session_active(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Subscriber for test log output; `RUST_LOG=aria_core=debug` shows the
/// transition and dispatch traces when a scenario fails.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// The assembled orchestrator minus the real socket.
struct Harness {
    bus: Arc<EventBus>,
    dispatcher: EventDispatcher,
    machine: Arc<StateMachine>,
    player: Arc<StreamingPlayer>,
    output: Arc<FakeOutput>,
    outbound_rx: mpsc::UnboundedReceiver<ClientEvent>,
    started: Arc<AtomicUsize>,
    completed: Arc<AtomicUsize>,
    interrupted: Arc<AtomicUsize>,
}

fn build_harness(registry: ToolRegistry) -> Harness {
    init_tracing();
    let bus = Arc::new(EventBus::new().unwrap());
    bus.attach_runtime(tokio::runtime::Handle::current());

    let (outbound, outbound_rx) = Outbound::channel();
    let registry = Arc::new(registry);
    let settings = Arc::new(RwLock::new(AssistantSettings::default()));
    let context = CurrentResponseContext::new();
    let manager = MessageManager::new(
        outbound.clone(),
        context.clone(),
        registry.clone(),
        settings.clone(),
    );

    let output = Arc::new(FakeOutput::default());
    let player = StreamingPlayer::new(output.clone(), bus.clone());
    let cues = SoundCuePlayer::new(output.clone(), "/nonexistent/sounds");
    let sound_handler = SoundEventHandler::new(player.clone(), cues.clone(), bus.clone());

    let mic: Arc<dyn MicrophoneSource> = Arc::new(SilentMic(AtomicBool::new(false)));
    let capture = CaptureStream::new(mic, outbound);

    let specials = Arc::new(SpecialToolParameters {
        audio_player: Some(player.clone()),
        event_bus: Some(bus.clone()),
        settings: Some(settings),
        tool_calling_model_name: None,
        user_context: None,
    });
    let executor = ToolExecutor::new(registry, manager.clone(), specials, bus.clone());

    let session: Arc<dyn SessionControl> = Arc::new(FakeSession(AtomicBool::new(false)));
    let machine = StateMachine::new(
        session,
        capture,
        cues,
        bus.clone(),
        Duration::from_secs(10),
    );

    // Same subscription order as the coordinator: the machine must enter
    // ToolCalling before the executor can publish the tool result
    machine.subscribe(&bus);
    manager.subscribe(&bus);
    context.subscribe(&bus);
    player.subscribe(&bus);
    sound_handler.subscribe(&bus);
    executor.subscribe(&bus);
    player.start().unwrap();

    let started = Arc::new(AtomicUsize::new(0));
    let completed = Arc::new(AtomicUsize::new(0));
    let interrupted = Arc::new(AtomicUsize::new(0));
    for (event, counter) in [
        (VoiceAssistantEvent::AssistantStartedResponse, &started),
        (VoiceAssistantEvent::AssistantCompletedResponse, &completed),
        (VoiceAssistantEvent::AssistantSpeechInterrupted, &interrupted),
    ] {
        let counter = counter.clone();
        bus.subscribe(
            event,
            Handler::sync0(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );
    }

    Harness {
        dispatcher: EventDispatcher::new(bus.clone()),
        bus,
        machine,
        player,
        output,
        outbound_rx,
        started,
        completed,
        interrupted,
    }
}

fn pcm_delta(item_id: &str, samples: &[i16]) -> serde_json::Value {
    use base64::{engine::general_purpose::STANDARD, Engine};
    let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
    json!({
        "type": "response.output_audio.delta",
        "item_id": item_id,
        "delta": STANDARD.encode(bytes),
    })
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(120)).await;
}

fn drain_outbound(rx: &mut mpsc::UnboundedReceiver<ClientEvent>) -> Vec<ClientEvent> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}

#[tokio::test(flavor = "multi_thread")]
async fn cold_start_wake_and_short_exchange() {
    let mut h = build_harness(ToolRegistry::new());
    assert_eq!(h.machine.current_state().await, AssistantState::Idle);

    // Wake word arrives from the detector thread
    h.bus
        .publish_sync(VoiceAssistantEvent::WakeWordDetected, None);
    settle().await;
    assert_eq!(h.machine.current_state().await, AssistantState::Listening);

    // Remote VAD hears the user, then the model responds with three chunks
    h.dispatcher
        .dispatch(json!({"type": "input_audio_buffer.speech_stopped"}));
    settle().await;
    assert_eq!(h.machine.current_state().await, AssistantState::Responding);

    h.dispatcher.dispatch(json!({"type": "response.created"}));
    settle().await;
    h.dispatcher.dispatch(pcm_delta("R1", &[1, 1]));
    h.dispatcher.dispatch(pcm_delta("R1", &[2, 2]));
    h.dispatcher.dispatch(pcm_delta("R1", &[3, 3]));
    settle().await;
    h.dispatcher.dispatch(json!({"type": "response.done"}));
    settle().await;

    assert_eq!(h.machine.current_state().await, AssistantState::Listening);
    assert_eq!(h.started.load(Ordering::SeqCst), 1);
    assert_eq!(h.completed.load(Ordering::SeqCst), 1);

    // Playback received the chunks in order
    let written = h.output.written.lock().clone();
    assert_eq!(written, vec![vec![1, 1], vec![2, 2], vec![3, 3]]);

    // Wait past the debounce window: the drain fallback must not produce a
    // second completion after the protocol already completed the response
    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(h.completed.load(Ordering::SeqCst), 1);

    h.machine.shutdown();
    h.player.stop();
}

#[tokio::test(flavor = "multi_thread")]
async fn barge_in_truncates_at_latched_item() {
    let mut h = build_harness(ToolRegistry::new());

    h.bus
        .publish_sync(VoiceAssistantEvent::WakeWordDetected, None);
    settle().await;
    h.dispatcher
        .dispatch(json!({"type": "input_audio_buffer.speech_stopped"}));
    h.dispatcher.dispatch(json!({"type": "response.created"}));
    settle().await;
    h.dispatcher.dispatch(pcm_delta("R1", &[1, 1]));
    h.dispatcher.dispatch(pcm_delta("R1", &[2, 2]));
    settle().await;

    // User interrupts while the assistant is audibly playing
    h.dispatcher
        .dispatch(json!({"type": "input_audio_buffer.speech_started"}));
    settle().await;

    assert_eq!(h.interrupted.load(Ordering::SeqCst), 1);
    assert_eq!(h.machine.current_state().await, AssistantState::Listening);
    assert_eq!(h.player.queue_len(), 0);
    assert!(h.output.stops.load(Ordering::SeqCst) >= 1);

    // A truncate frame went out for the latched item with a small offset
    let events = drain_outbound(&mut h.outbound_rx);
    let truncate = events
        .iter()
        .find_map(|e| match e {
            ClientEvent::ConversationItemTruncate {
                item_id,
                content_index,
                audio_end_ms,
            } => Some((item_id.clone(), *content_index, *audio_end_ms)),
            _ => None,
        })
        .expect("no truncate frame sent");
    assert_eq!(truncate.0, "R1");
    assert_eq!(truncate.1, 0);
    assert!(truncate.2 < 1000, "audio_end_ms was {}", truncate.2);

    h.machine.shutdown();
    h.player.stop();
}

#[tokio::test(flavor = "multi_thread")]
async fn tool_call_round_trip() {
    let registry = ToolRegistry::new();
    registry
        .register(Tool::function(
            "get_time",
            "Current local time",
            ToolSchema::new(),
            |_inv| async { Ok(ToolOutput::Text("13:05:00".into())) },
        ))
        .unwrap();
    let mut h = build_harness(registry);

    h.bus
        .publish_sync(VoiceAssistantEvent::WakeWordDetected, None);
    settle().await;
    h.dispatcher
        .dispatch(json!({"type": "input_audio_buffer.speech_stopped"}));
    settle().await;

    h.dispatcher.dispatch(json!({
        "type": "response.function_call_arguments.done",
        "name": "get_time",
        "call_id": "C7",
        "arguments": {}
    }));
    settle().await;

    // The executor ran, submitted the result, and the machine cycled
    // ToolCalling -> Responding
    assert_eq!(h.machine.current_state().await, AssistantState::Responding);

    let events = drain_outbound(&mut h.outbound_rx);
    assert_eq!(events.len(), 2);
    let item = serde_json::to_value(&events[0]).unwrap();
    assert_eq!(item["type"], "conversation.item.create");
    assert_eq!(item["item"]["type"], "function_call_output");
    assert_eq!(item["item"]["call_id"], "C7");
    assert_eq!(item["item"]["output"], "13:05:00");
    let response = serde_json::to_value(&events[1]).unwrap();
    assert_eq!(response["type"], "response.create");

    h.machine.shutdown();
    h.player.stop();
}

#[tokio::test(flavor = "multi_thread")]
async fn streaming_tool_speaks_each_chunk() {
    let registry = ToolRegistry::new();
    registry
        .register(Tool::streaming(
            "status_report",
            "Reports progress",
            ToolSchema::new().optional("detail", ParamType::String, "Level of detail"),
            |_inv| async {
                // An incremental producer, the way a real long-running tool
                // would feed progress
                let (tx, rx) = mpsc::channel(8);
                tokio::spawn(async move {
                    for chunk in ["A", "B", "C"] {
                        if tx.send(chunk.to_string()).await.is_err() {
                            break;
                        }
                    }
                });
                Ok(Box::pin(tokio_stream::wrappers::ReceiverStream::new(rx)) as ChunkStream)
            },
        ))
        .unwrap();
    let mut h = build_harness(registry);

    h.dispatcher.dispatch(json!({
        "type": "response.function_call_arguments.done",
        "name": "status_report",
        "call_id": "C9",
        "arguments": "{}"
    }));
    tokio::time::sleep(Duration::from_millis(300)).await;

    let events = drain_outbound(&mut h.outbound_rx);
    assert_eq!(events.len(), 3);
    for (event, chunk) in events.iter().zip(["A", "B", "C"]) {
        let json = serde_json::to_value(event).unwrap();
        assert_eq!(json["type"], "response.create");
        assert!(json["response"]["instructions"]
            .as_str()
            .unwrap()
            .contains(&format!("'{chunk}'")));
    }

    h.machine.shutdown();
    h.player.stop();
}

#[tokio::test(flavor = "multi_thread")]
async fn tool_results_queue_while_response_active() {
    let registry = ToolRegistry::new();
    registry
        .register(Tool::function(
            "first",
            "First tool",
            ToolSchema::new(),
            |_inv| async { Ok(ToolOutput::Text("one".into())) },
        ))
        .unwrap();
    registry
        .register(Tool::function(
            "second",
            "Second tool",
            ToolSchema::new(),
            |_inv| async { Ok(ToolOutput::Text("two".into())) },
        ))
        .unwrap();
    let mut h = build_harness(registry);

    // A response is in flight
    h.dispatcher.dispatch(json!({"type": "response.created"}));
    settle().await;

    h.dispatcher.dispatch(json!({
        "type": "response.function_call_arguments.done",
        "name": "first",
        "call_id": "C1",
        "arguments": {}
    }));
    h.dispatcher.dispatch(json!({
        "type": "response.function_call_arguments.done",
        "name": "second",
        "call_id": "C2",
        "arguments": {}
    }));
    settle().await;

    // Nothing sent while the response is active
    assert!(drain_outbound(&mut h.outbound_rx).is_empty());

    h.dispatcher.dispatch(json!({"type": "response.done"}));
    tokio::time::sleep(Duration::from_millis(600)).await;

    // Both results drained in invocation order, item + response.create each
    let events = drain_outbound(&mut h.outbound_rx);
    assert_eq!(events.len(), 4);
    let first = serde_json::to_value(&events[0]).unwrap();
    assert_eq!(first["item"]["call_id"], "C1");
    let second = serde_json::to_value(&events[2]).unwrap();
    assert_eq!(second["item"]["call_id"], "C2");

    h.machine.shutdown();
    h.player.stop();
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_and_unknown_frames_do_not_disturb_state() {
    let mut h = build_harness(ToolRegistry::new());

    h.bus
        .publish_sync(VoiceAssistantEvent::WakeWordDetected, None);
    settle().await;
    assert_eq!(h.machine.current_state().await, AssistantState::Listening);

    // Unknown type, legacy name with empty delta, missing required fields
    h.dispatcher
        .dispatch(json!({"type": "response.audio.delta", "delta": ""}));
    h.dispatcher.dispatch(json!({"type": "nonsense.event"}));
    h.dispatcher
        .dispatch(json!({"type": "response.output_audio.delta", "delta": "AAAA"}));
    h.dispatcher
        .dispatch(json!({"type": "conversation.item.truncated", "item_id": "X"}));
    settle().await;

    assert_eq!(h.machine.current_state().await, AssistantState::Listening);
    assert_eq!(h.started.load(Ordering::SeqCst), 0);
    assert!(drain_outbound(&mut h.outbound_rx).is_empty());
    assert_eq!(h.player.queue_len(), 0);

    h.machine.shutdown();
    h.player.stop();
}
