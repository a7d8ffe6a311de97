//! TOML configuration file loading
//!
//! Supports `~/.config/lumen/config.toml` as a persistent config source.
//! All fields are optional, the file is a partial overlay on top of
//! defaults.

use std::collections::HashMap;

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct LumenConfigFile {
    /// Wake/sleep behavior
    #[serde(default)]
    pub assistant: AssistantFileConfig,

    /// Voice capture tuning
    #[serde(default)]
    pub capture: CaptureFileConfig,

    /// Speech-to-text endpoint
    #[serde(default)]
    pub stt: EngineFileConfig,

    /// Text-to-speech endpoint
    #[serde(default)]
    pub tts: TtsFileConfig,

    /// Intent classifier endpoint
    #[serde(default)]
    pub llm: LlmFileConfig,

    /// Application launch table for the open-app skill
    #[serde(default)]
    pub apps: HashMap<String, String>,
}

/// Wake/sleep behavior
#[derive(Debug, Default, Deserialize)]
pub struct AssistantFileConfig {
    /// Wake phrase matched as a substring of transcripts
    pub wake_phrase: Option<String>,

    /// Commands that put the assistant to sleep immediately
    pub sleep_commands: Option<Vec<String>>,

    /// Commands that abort the current exchange and silence playback
    pub interrupt_commands: Option<Vec<String>>,

    /// Inactivity timeout in seconds before going back to sleep
    pub sleep_timeout_secs: Option<u64>,
}

/// Voice capture tuning
#[derive(Debug, Default, Deserialize)]
pub struct CaptureFileConfig {
    /// RMS energy threshold (i16 domain)
    pub silence_threshold: Option<f32>,

    /// Trailing silence in seconds that ends an utterance
    pub silence_duration_secs: Option<f32>,

    /// Minimum recording length in seconds
    pub min_record_secs: Option<f32>,
}

/// Generic HTTP engine endpoint
#[derive(Debug, Default, Deserialize)]
pub struct EngineFileConfig {
    /// Full endpoint URL
    pub url: Option<String>,

    /// Model identifier sent with each request
    pub model: Option<String>,

    /// Bearer token, if the endpoint needs one
    pub api_key: Option<String>,
}

/// Text-to-speech endpoint
#[derive(Debug, Default, Deserialize)]
pub struct TtsFileConfig {
    pub url: Option<String>,
    pub model: Option<String>,
    pub voice: Option<String>,
    pub api_key: Option<String>,
}

/// Intent classifier endpoint
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    pub url: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,

    /// Override for the built-in system prompt; may use
    /// `{current_datetime}` and `{user_profile}` placeholders
    pub system_prompt: Option<String>,
}
