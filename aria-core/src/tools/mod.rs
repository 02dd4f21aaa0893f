//! Tools — local handlers the model can call in-session.
//!
//! A `Tool` bundles a handler (plain async function or streaming), an
//! explicit parameter schema, and optional response/progress instructions.
//! Special parameters (audio player, event bus, settings) are injected by the
//! executor at call time and never appear in the schema the model sees.

pub mod executor;
pub mod registry;
pub mod schema;

pub use executor::ToolExecutor;
pub use registry::ToolRegistry;
pub use schema::{ParamType, ToolSchema};

use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::Stream;
use parking_lot::RwLock;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::config::AssistantSettings;
use crate::events::bus::EventBus;
use crate::protocol::session::ToolDefinition;

/// Key under which an undecodable argument string is preserved instead of
/// being discarded.
pub const RAW_ARGUMENTS_KEY: &str = "__raw__";

pub type ToolArguments = Map<String, Value>;

/// One tool/function call request emitted by the model
/// (`response.function_call_arguments.done`).
#[derive(Debug, Clone, Deserialize)]
pub struct FunctionCallItem {
    #[serde(default)]
    pub name: Option<String>,
    pub call_id: String,
    #[serde(default, deserialize_with = "deserialize_arguments")]
    pub arguments: ToolArguments,
    #[serde(default)]
    pub response_id: Option<String>,
    #[serde(default)]
    pub item_id: Option<String>,
}

/// Arguments arrive either as a native JSON object or as a JSON-encoded
/// string. An undecodable string is preserved under `__raw__` rather than
/// discarded.
fn deserialize_arguments<'de, D>(deserializer: D) -> Result<ToolArguments, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        Value::String(s) => {
            if s.trim().is_empty() {
                return Ok(Map::new());
            }
            match serde_json::from_str::<Value>(&s) {
                Ok(Value::Object(map)) => Ok(map),
                _ => {
                    let mut map = Map::new();
                    map.insert(RAW_ARGUMENTS_KEY.to_string(), Value::String(s));
                    Ok(map)
                }
            }
        }
        _ => Err(serde::de::Error::custom(
            "arguments must be an object or a JSON string",
        )),
    }
}

/// The value a tool handler produces.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    None,
    Text(String),
    Json(Value),
}

impl ToolOutput {
    /// Wire serialization: strings pass through, structured values are
    /// JSON-encoded (falling back to their display form), nothing becomes
    /// the empty string.
    pub fn serialize(&self) -> String {
        match self {
            ToolOutput::None => String::new(),
            ToolOutput::Text(s) => s.clone(),
            ToolOutput::Json(v) => serde_json::to_string(v).unwrap_or_else(|_| v.to_string()),
        }
    }
}

impl From<String> for ToolOutput {
    fn from(s: String) -> Self {
        ToolOutput::Text(s)
    }
}

impl From<&str> for ToolOutput {
    fn from(s: &str) -> Self {
        ToolOutput::Text(s.to_string())
    }
}

impl From<Value> for ToolOutput {
    fn from(v: Value) -> Self {
        ToolOutput::Json(v)
    }
}

/// Result of a tool execution, on its way back to the remote session.
#[derive(Debug, Clone)]
pub struct FunctionCallResult {
    pub tool_name: String,
    pub call_id: String,
    pub output: ToolOutput,
    pub response_instruction: Option<String>,
}

impl FunctionCallResult {
    /// The `conversation.item.create` carrying this result.
    pub fn to_conversation_item(&self) -> crate::protocol::client::ClientEvent {
        crate::protocol::client::ClientEvent::function_call_output(
            self.call_id.clone(),
            self.output.serialize(),
        )
    }
}

/// Runtime-provided values injected into tool handlers by name, never
/// exposed in the public schema. A static capability struct with a
/// name-based lookup — no introspection at call time.
#[derive(Clone, Default)]
pub struct SpecialToolParameters {
    pub audio_player: Option<Arc<crate::audio::playback::StreamingPlayer>>,
    pub event_bus: Option<Arc<EventBus>>,
    pub settings: Option<Arc<RwLock<AssistantSettings>>>,
    pub tool_calling_model_name: Option<String>,
    /// Opaque user-provided context (db handles, queues, whatever the
    /// embedder wants reachable from tools)
    pub user_context: Option<Arc<dyn Any + Send + Sync>>,
}

impl SpecialToolParameters {
    pub const FIELD_NAMES: &'static [&'static str] = &[
        "audio_player",
        "event_bus",
        "settings",
        "tool_calling_model_name",
        "user_context",
    ];

    pub fn is_special_name(name: &str) -> bool {
        Self::FIELD_NAMES.contains(&name)
    }

    /// Whether a value for the named field is currently available.
    pub fn is_available(&self, name: &str) -> bool {
        match name {
            "audio_player" => self.audio_player.is_some(),
            "event_bus" => self.event_bus.is_some(),
            "settings" => self.settings.is_some(),
            "tool_calling_model_name" => self.tool_calling_model_name.is_some(),
            "user_context" => self.user_context.is_some(),
            _ => false,
        }
    }
}

/// What a handler receives: the model-supplied arguments plus the injected
/// runtime capabilities.
#[derive(Clone)]
pub struct ToolInvocation {
    pub arguments: ToolArguments,
    pub specials: Arc<SpecialToolParameters>,
}

impl ToolInvocation {
    pub fn arg_str(&self, name: &str) -> Option<&str> {
        self.arguments.get(name).and_then(Value::as_str)
    }

    pub fn arg_i64(&self, name: &str) -> Option<i64> {
        self.arguments.get(name).and_then(Value::as_i64)
    }

    pub fn arg_f64(&self, name: &str) -> Option<f64> {
        self.arguments.get(name).and_then(Value::as_f64)
    }

    pub fn arg_bool(&self, name: &str) -> Option<bool> {
        self.arguments.get(name).and_then(Value::as_bool)
    }
}

type ToolFuture = Pin<Box<dyn Future<Output = Result<ToolOutput, String>> + Send>>;
/// A streaming tool yields short spoken progress chunks over time.
pub type ChunkStream = Pin<Box<dyn Stream<Item = String> + Send>>;
type StreamFuture = Pin<Box<dyn Future<Output = Result<ChunkStream, String>> + Send>>;

pub enum ToolHandler {
    Function(Arc<dyn Fn(ToolInvocation) -> ToolFuture + Send + Sync>),
    Streaming(Arc<dyn Fn(ToolInvocation) -> StreamFuture + Send + Sync>),
}

/// A registered tool: unique name, description, handler, derived schema.
pub struct Tool {
    pub name: String,
    pub description: String,
    pub handler: ToolHandler,
    pub schema: ToolSchema,
    /// Instruction sent with the result's `response.create`
    pub response_instruction: Option<String>,
    /// Short spoken progress update sent as soon as execution starts
    pub execution_message: Option<String>,
}

impl Tool {
    pub fn function<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: ToolSchema,
        f: F,
    ) -> Self
    where
        F: Fn(ToolInvocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolOutput, String>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            handler: ToolHandler::Function(Arc::new(move |inv| Box::pin(f(inv)) as ToolFuture)),
            schema,
            response_instruction: None,
            execution_message: None,
        }
    }

    pub fn streaming<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: ToolSchema,
        f: F,
    ) -> Self
    where
        F: Fn(ToolInvocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ChunkStream, String>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            handler: ToolHandler::Streaming(Arc::new(move |inv| Box::pin(f(inv)) as StreamFuture)),
            schema,
            response_instruction: None,
            execution_message: None,
        }
    }

    pub fn with_response_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.response_instruction = Some(instruction.into());
        self
    }

    pub fn with_execution_message(mut self, message: impl Into<String>) -> Self {
        self.execution_message = Some(message.into());
        self
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.handler, ToolHandler::Streaming(_))
    }

    /// The session-config entry for this tool.
    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition::Function {
            name: self.name.clone(),
            description: Some(self.description.clone()),
            parameters: self.schema.to_json(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_arguments_from_native_map() {
        let item: FunctionCallItem = serde_json::from_value(json!({
            "call_id": "C1",
            "name": "get_weather",
            "arguments": {"city": "Berlin"}
        }))
        .unwrap();
        assert_eq!(item.arguments["city"], "Berlin");
    }

    #[test]
    fn test_arguments_from_json_string() {
        let item: FunctionCallItem = serde_json::from_value(json!({
            "call_id": "C1",
            "arguments": "{\"city\": \"Berlin\"}"
        }))
        .unwrap();
        assert_eq!(item.arguments["city"], "Berlin");
    }

    #[test]
    fn test_blank_argument_string_is_empty_map() {
        let item: FunctionCallItem = serde_json::from_value(json!({
            "call_id": "C1",
            "arguments": "  "
        }))
        .unwrap();
        assert!(item.arguments.is_empty());
    }

    #[test]
    fn test_undecodable_argument_string_preserved_raw() {
        let item: FunctionCallItem = serde_json::from_value(json!({
            "call_id": "C1",
            "arguments": "not json {{"
        }))
        .unwrap();
        assert_eq!(item.arguments[RAW_ARGUMENTS_KEY], "not json {{");
    }

    #[test]
    fn test_output_serialization() {
        assert_eq!(ToolOutput::None.serialize(), "");
        assert_eq!(ToolOutput::Text("13:05:00".into()).serialize(), "13:05:00");
        assert_eq!(
            ToolOutput::Json(json!({"temp": 21})).serialize(),
            r#"{"temp":21}"#
        );
    }

    #[test]
    fn test_string_output_roundtrip() {
        let result = FunctionCallResult {
            tool_name: "get_time".into(),
            call_id: "C7".into(),
            output: ToolOutput::Text("13:05:00".into()),
            response_instruction: None,
        };
        let json = serde_json::to_value(result.to_conversation_item()).unwrap();
        assert_eq!(json["item"]["output"], "13:05:00");
    }

    #[test]
    fn test_structured_output_roundtrip_is_canonical_json() {
        let payload = json!({"a": [1, 2], "b": "x"});
        let result = FunctionCallResult {
            tool_name: "lookup".into(),
            call_id: "C8".into(),
            output: ToolOutput::Json(payload.clone()),
            response_instruction: None,
        };
        let event = serde_json::to_value(result.to_conversation_item()).unwrap();
        let reparsed: Value =
            serde_json::from_str(event["item"]["output"].as_str().unwrap()).unwrap();
        assert_eq!(reparsed, payload);
    }

    #[test]
    fn test_special_parameter_lookup() {
        let specials = SpecialToolParameters {
            tool_calling_model_name: Some("gpt-4.1".into()),
            ..Default::default()
        };
        assert!(specials.is_available("tool_calling_model_name"));
        assert!(!specials.is_available("audio_player"));
        assert!(!specials.is_available("no_such_field"));
        assert!(SpecialToolParameters::is_special_name("event_bus"));
        assert!(!SpecialToolParameters::is_special_name("city"));
    }
}
