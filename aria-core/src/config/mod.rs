//! Assistant settings and environment wiring.
//!
//! Settings are immutable at session start; the only sanctioned mutation path
//! afterwards is an `AssistantConfigUpdateRequest` flowing through the bus
//! (speech speed, voice). Validation happens here, at the boundary, so the
//! rest of the system never sees an out-of-range speed or a malformed
//! language code.

use serde::{Deserialize, Serialize};

use crate::error::AssistantError;

/// Allowed speech-speed range for the realtime voice
pub const MIN_SPEECH_SPEED: f32 = 0.25;
pub const MAX_SPEECH_SPEED: f32 = 1.5;

/// Assistant voices supported by the realtime API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssistantVoice {
    Alloy,
    Ash,
    Ballad,
    Coral,
    Echo,
    Sage,
    Shimmer,
    Verse,
    Cedar,
    Marin,
}

impl AssistantVoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssistantVoice::Alloy => "alloy",
            AssistantVoice::Ash => "ash",
            AssistantVoice::Ballad => "ballad",
            AssistantVoice::Coral => "coral",
            AssistantVoice::Echo => "echo",
            AssistantVoice::Sage => "sage",
            AssistantVoice::Shimmer => "shimmer",
            AssistantVoice::Verse => "verse",
            AssistantVoice::Cedar => "cedar",
            AssistantVoice::Marin => "marin",
        }
    }
}

/// Noise-reduction profile applied to input audio by the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoiseReductionKind {
    NearField,
    FarField,
}

/// Model-facing settings: which model, what instructions, sampling.
#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub model: String,
    pub instructions: Option<String>,
    pub temperature: f32,
    /// None = let the model run unbounded ("inf" on the wire)
    pub max_output_tokens: Option<u32>,
    /// Model name surfaced to tools that delegate to a text model
    pub tool_calling_model_name: Option<String>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model: "gpt-realtime".to_string(),
            instructions: None,
            temperature: 0.8,
            max_output_tokens: None,
            tool_calling_model_name: None,
        }
    }
}

/// Voice and audio-output settings.
#[derive(Debug, Clone)]
pub struct VoiceSettings {
    pub voice: AssistantVoice,
    speech_speed: f32,
    pub noise_reduction: Option<NoiseReductionKind>,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            voice: AssistantVoice::Marin,
            speech_speed: 1.0,
            noise_reduction: None,
        }
    }
}

impl VoiceSettings {
    pub fn new(voice: AssistantVoice, speech_speed: f32) -> Self {
        Self {
            voice,
            speech_speed: clamp_speech_speed(speech_speed),
            noise_reduction: None,
        }
    }

    pub fn speech_speed(&self) -> f32 {
        self.speech_speed
    }

    /// Out-of-range values are clamped, not rejected.
    pub fn set_speech_speed(&mut self, speed: f32) {
        self.speech_speed = clamp_speech_speed(speed);
    }
}

/// Clamp a requested speech speed into the supported range.
pub fn clamp_speech_speed(speed: f32) -> f32 {
    speed.clamp(MIN_SPEECH_SPEED, MAX_SPEECH_SPEED)
}

/// Input-audio transcription settings (optional).
#[derive(Debug, Clone, Default)]
pub struct TranscriptionSettings {
    pub enabled: bool,
    pub model: String,
    pub language: Option<String>,
    pub prompt: Option<String>,
}

impl TranscriptionSettings {
    pub fn whisper() -> Self {
        Self {
            enabled: true,
            model: "whisper-1".to_string(),
            language: None,
            prompt: None,
        }
    }

    pub fn with_language(mut self, code: &str) -> Result<Self, AssistantError> {
        self.language = Some(normalize_language_code(code)?);
        Ok(self)
    }
}

/// Normalize an ISO-639 language code: trimmed, lowercased, 2-3 alphabetic
/// characters. Anything else is a configuration error.
pub fn normalize_language_code(code: &str) -> Result<String, AssistantError> {
    let lang = code.trim().to_lowercase();
    if (lang.len() == 2 || lang.len() == 3) && lang.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(lang)
    } else {
        Err(AssistantError::InvalidConfig(format!(
            "invalid language code {code:?}, expected ISO-639 format (e.g. \"en\", \"de\")"
        )))
    }
}

/// Wake-word engine settings.
#[derive(Debug, Clone)]
pub struct WakeWordSettings {
    pub keyword: String,
    pub sensitivity: f32,
}

impl Default for WakeWordSettings {
    fn default() -> Self {
        Self {
            keyword: "picovoice".to_string(),
            sensitivity: 0.7,
        }
    }
}

/// A runtime settings change requested through the bus
/// (`AssistantConfigUpdateRequest`). Only the fields that are safe to change
/// mid-session are representable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigUpdateRequest {
    pub speech_speed: Option<f32>,
    pub voice: Option<AssistantVoice>,
    pub instructions: Option<String>,
}

/// Top-level settings bundle, built once at startup.
#[derive(Debug, Clone)]
pub struct AssistantSettings {
    pub model: ModelSettings,
    pub voice: VoiceSettings,
    pub transcription: TranscriptionSettings,
    pub wake_word: WakeWordSettings,
    /// User-silence bound while listening before the session returns to idle
    pub listening_timeout: std::time::Duration,
}

impl Default for AssistantSettings {
    fn default() -> Self {
        Self {
            model: ModelSettings::default(),
            voice: VoiceSettings::default(),
            transcription: TranscriptionSettings::default(),
            wake_word: WakeWordSettings::default(),
            listening_timeout: std::time::Duration::from_secs(
                crate::audio_constants::LISTENING_TIMEOUT_SECS,
            ),
        }
    }
}

/// Credentials resolved from the environment. Absence of either key is a
/// fatal startup error.
#[derive(Debug, Clone)]
pub struct AssistantEnv {
    pub api_key: String,
    pub wake_word_access_key: String,
}

impl AssistantEnv {
    pub const API_KEY_VAR: &'static str = "OPENAI_API_KEY";
    pub const WAKE_WORD_KEY_VAR: &'static str = "PICOVOICE_ACCESS_KEY";

    pub fn load() -> Result<Self, AssistantError> {
        let api_key = std::env::var(Self::API_KEY_VAR)
            .map_err(|_| AssistantError::MissingCredential(Self::API_KEY_VAR))?;
        let wake_word_access_key = std::env::var(Self::WAKE_WORD_KEY_VAR)
            .map_err(|_| AssistantError::MissingCredential(Self::WAKE_WORD_KEY_VAR))?;
        Ok(Self {
            api_key,
            wake_word_access_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speech_speed_clamped_low() {
        assert_eq!(clamp_speech_speed(0.0), 0.25);
        let settings = VoiceSettings::new(AssistantVoice::Marin, 0.0);
        assert_eq!(settings.speech_speed(), 0.25);
    }

    #[test]
    fn test_speech_speed_clamped_high() {
        assert_eq!(clamp_speech_speed(5.0), 1.5);
        let mut settings = VoiceSettings::default();
        settings.set_speech_speed(5.0);
        assert_eq!(settings.speech_speed(), 1.5);
    }

    #[test]
    fn test_speech_speed_in_range_untouched() {
        assert_eq!(clamp_speech_speed(1.0), 1.0);
        assert_eq!(clamp_speech_speed(0.25), 0.25);
        assert_eq!(clamp_speech_speed(1.5), 1.5);
    }

    #[test]
    fn test_language_code_normalized() {
        assert_eq!(normalize_language_code("EN").unwrap(), "en");
        assert_eq!(normalize_language_code(" de ").unwrap(), "de");
        assert_eq!(normalize_language_code("deu").unwrap(), "deu");
    }

    #[test]
    fn test_language_code_rejected() {
        assert!(normalize_language_code("english").is_err());
        assert!(normalize_language_code("e1").is_err());
        assert!(normalize_language_code("").is_err());
    }

    #[test]
    fn test_voice_serializes_lowercase() {
        let json = serde_json::to_value(AssistantVoice::Marin).unwrap();
        assert_eq!(json, "marin");
    }
}
