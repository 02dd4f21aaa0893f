//! Session configuration wire shape.
//!
//! Built once from `AssistantSettings` when the session starts, sent as the
//! payload of `session.update`, and rebuilt whenever a config-update request
//! changes the live settings.

use serde::{Deserialize, Serialize};

use crate::config::{AssistantSettings, NoiseReductionKind};

/// PCM16 is the only format this orchestrator speaks.
pub const AUDIO_FORMAT_PCM16: &str = "audio/pcm";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(rename = "type")]
    pub session_type: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    pub temperature: f32,
    pub audio: AudioConfig,
    pub output_modalities: Vec<String>,
    pub max_output_tokens: MaxOutputTokens,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

impl SessionConfig {
    /// Map settings plus the registry's tool schemas onto the wire shape.
    pub fn build(settings: &AssistantSettings, tools: Vec<ToolDefinition>) -> Self {
        let transcription = settings.transcription.enabled.then(|| TranscriptionConfig {
            model: settings.transcription.model.clone(),
            language: settings.transcription.language.clone(),
            prompt: settings.transcription.prompt.clone(),
        });

        Self {
            session_type: "realtime".to_string(),
            model: settings.model.model.clone(),
            instructions: settings.model.instructions.clone(),
            temperature: settings.model.temperature,
            audio: AudioConfig {
                input: AudioInputConfig {
                    format: AudioFormatConfig::pcm16(),
                    noise_reduction: settings.voice.noise_reduction.map(NoiseReductionConfig::from),
                    transcription,
                    turn_detection: Some(TurnDetectionConfig::default()),
                },
                output: AudioOutputConfig {
                    format: AudioFormatConfig::pcm16(),
                    voice: settings.voice.voice.as_str().to_string(),
                    speed: settings.voice.speech_speed(),
                },
            },
            output_modalities: vec!["audio".to_string()],
            max_output_tokens: match settings.model.max_output_tokens {
                Some(n) => MaxOutputTokens::Limited(n),
                None => MaxOutputTokens::Inf,
            },
            tools,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    pub input: AudioInputConfig,
    pub output: AudioOutputConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioInputConfig {
    pub format: AudioFormatConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub noise_reduction: Option<NoiseReductionConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcription: Option<TranscriptionConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_detection: Option<TurnDetectionConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioOutputConfig {
    pub format: AudioFormatConfig,
    pub voice: String,
    pub speed: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioFormatConfig {
    #[serde(rename = "type")]
    pub kind: String,
}

impl AudioFormatConfig {
    pub fn pcm16() -> Self {
        Self {
            kind: AUDIO_FORMAT_PCM16.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoiseReductionConfig {
    #[serde(rename = "type")]
    pub kind: NoiseReductionKind,
}

impl From<NoiseReductionKind> for NoiseReductionConfig {
    fn from(kind: NoiseReductionKind) -> Self {
        Self { kind }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

/// Server-VAD turn detection, the mode this orchestrator relies on for
/// `speech_started` / `speech_stopped` boundaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnDetectionConfig {
    #[serde(rename = "type")]
    pub kind: String,
    pub threshold: f32,
    pub prefix_padding_ms: u32,
    pub silence_duration_ms: u32,
}

impl Default for TurnDetectionConfig {
    fn default() -> Self {
        Self {
            kind: "server_vad".to_string(),
            threshold: 0.5,
            prefix_padding_ms: 300,
            silence_duration_ms: 500,
        }
    }
}

/// `max_output_tokens` is either a number or the literal string "inf".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxOutputTokens {
    Inf,
    Limited(u32),
}

impl Serialize for MaxOutputTokens {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MaxOutputTokens::Inf => serializer.serialize_str("inf"),
            MaxOutputTokens::Limited(n) => serializer.serialize_u32(*n),
        }
    }
}

impl<'de> Deserialize<'de> for MaxOutputTokens {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        match value {
            serde_json::Value::String(s) if s == "inf" => Ok(MaxOutputTokens::Inf),
            serde_json::Value::Number(n) => n
                .as_u64()
                .map(|n| MaxOutputTokens::Limited(n as u32))
                .ok_or_else(|| serde::de::Error::custom("max_output_tokens must be non-negative")),
            other => Err(serde::de::Error::custom(format!(
                "max_output_tokens must be a number or \"inf\", got {other}"
            ))),
        }
    }
}

/// A tool entry in the session config: a local function tool with its derived
/// JSON schema, or a reference to a remote MCP server the model calls
/// directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ToolDefinition {
    #[serde(rename = "function")]
    Function {
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        parameters: serde_json::Value,
    },

    #[serde(rename = "mcp")]
    Mcp {
        server_label: String,
        server_url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        authorization: Option<String>,
    },
}
