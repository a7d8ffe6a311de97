//! Configuration management
//!
//! Built-in defaults, overlaid by `~/.config/lumen/config.toml` when
//! present, overlaid by environment variables for secrets. All endpoints
//! default to a local OpenAI-compatible server.

pub mod file;

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;

use crate::voice::capture::CaptureConfig;
use crate::{Error, Result};
use file::LumenConfigFile;

/// Default chat-completions endpoint (LM Studio)
const DEFAULT_LLM_URL: &str = "http://localhost:1234/v1/chat/completions";
const DEFAULT_STT_URL: &str = "http://localhost:1234/v1/audio/transcriptions";
const DEFAULT_TTS_URL: &str = "http://localhost:1234/v1/audio/speech";

/// Built-in classifier system prompt
const DEFAULT_SYSTEM_PROMPT: &str = "\
You are Lumen, a voice assistant. The current date and time is {current_datetime}.

What you know about the user:
{user_profile}

Classify the user's request. Respond with a single JSON object only:
{\"intent\": \"<intent>\", \"parameters\": {...}, \"response\": \"<short spoken reply>\"}

Known intents: chat, date_query, weather_report, search, open_app, send_message.
For \"search\", put the thing to look up in parameters as \"query\".
Use \"chat\" for anything conversational; put your reply in \"response\".
Only include parameters the user actually stated. If something important
is missing, include \"needs_clarification\": true. If the user reveals a
lasting personal fact, include it under \"memory_update\".";

/// Resolved runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Wake phrase matched as a substring of transcripts
    pub wake_phrase: String,

    /// Commands that put the assistant to sleep immediately
    pub sleep_commands: Vec<String>,

    /// Commands that abort the current exchange and silence playback
    pub interrupt_commands: Vec<String>,

    /// Inactivity timeout before going back to sleep
    pub sleep_timeout: Duration,

    /// Voice capture tuning
    pub capture: CaptureConfig,

    /// Speech-to-text endpoint
    pub stt: EngineConfig,

    /// Text-to-speech endpoint
    pub tts: TtsConfig,

    /// Intent classifier endpoint
    pub llm: LlmConfig,

    /// Long-term memory file location
    pub memory_path: PathBuf,

    /// Application launch table for the open-app skill
    pub apps: HashMap<String, String>,
}

/// HTTP engine endpoint
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub url: String,
    pub model: String,
    pub api_key: Option<String>,
}

/// Text-to-speech endpoint
#[derive(Debug, Clone)]
pub struct TtsConfig {
    pub url: String,
    pub model: String,
    pub voice: String,
    pub api_key: Option<String>,
}

/// Intent classifier endpoint
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub system_prompt: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            wake_phrase: "lumen wake up".to_string(),
            sleep_commands: vec![
                "lumen go to sleep".to_string(),
                "go to sleep".to_string(),
                "lumen sleep".to_string(),
            ],
            interrupt_commands: vec![
                "mute".to_string(),
                "quit".to_string(),
                "exit".to_string(),
                "stop".to_string(),
            ],
            sleep_timeout: Duration::from_secs(120),
            capture: CaptureConfig::default(),
            stt: EngineConfig {
                url: DEFAULT_STT_URL.to_string(),
                model: "whisper-1".to_string(),
                api_key: None,
            },
            tts: TtsConfig {
                url: DEFAULT_TTS_URL.to_string(),
                model: "tts-1".to_string(),
                voice: "alloy".to_string(),
                api_key: None,
            },
            llm: LlmConfig {
                url: DEFAULT_LLM_URL.to_string(),
                model: "local-model".to_string(),
                api_key: None,
                system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            },
            memory_path: data_dir().join("memory.json"),
            apps: HashMap::new(),
        }
    }
}

impl Config {
    /// Load configuration: defaults, then the TOML file, then env secrets
    ///
    /// # Errors
    ///
    /// Returns error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        let path = config_file_path();
        if path.exists() {
            let text = std::fs::read_to_string(&path)?;
            let overlay: LumenConfigFile = toml::from_str(&text)
                .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
            config.apply_file(overlay);
            tracing::info!(path = %path.display(), "loaded config file");
        }

        config.apply_env();
        Ok(config)
    }

    fn apply_file(&mut self, overlay: LumenConfigFile) {
        if let Some(phrase) = overlay.assistant.wake_phrase {
            self.wake_phrase = phrase.to_lowercase();
        }
        if let Some(commands) = overlay.assistant.sleep_commands {
            self.sleep_commands = commands.into_iter().map(|c| c.to_lowercase()).collect();
        }
        if let Some(commands) = overlay.assistant.interrupt_commands {
            self.interrupt_commands = commands.into_iter().map(|c| c.to_lowercase()).collect();
        }
        if let Some(secs) = overlay.assistant.sleep_timeout_secs {
            self.sleep_timeout = Duration::from_secs(secs);
        }

        if let Some(threshold) = overlay.capture.silence_threshold {
            self.capture.silence_threshold = threshold;
        }
        if let Some(secs) = overlay.capture.silence_duration_secs {
            self.capture.silence_duration_secs = secs;
        }
        if let Some(secs) = overlay.capture.min_record_secs {
            self.capture.min_record_secs = secs;
        }

        if let Some(url) = overlay.stt.url {
            self.stt.url = url;
        }
        if let Some(model) = overlay.stt.model {
            self.stt.model = model;
        }
        if overlay.stt.api_key.is_some() {
            self.stt.api_key = overlay.stt.api_key;
        }

        if let Some(url) = overlay.tts.url {
            self.tts.url = url;
        }
        if let Some(model) = overlay.tts.model {
            self.tts.model = model;
        }
        if let Some(voice) = overlay.tts.voice {
            self.tts.voice = voice;
        }
        if overlay.tts.api_key.is_some() {
            self.tts.api_key = overlay.tts.api_key;
        }

        if let Some(url) = overlay.llm.url {
            self.llm.url = url;
        }
        if let Some(model) = overlay.llm.model {
            self.llm.model = model;
        }
        if overlay.llm.api_key.is_some() {
            self.llm.api_key = overlay.llm.api_key;
        }
        if let Some(prompt) = overlay.llm.system_prompt {
            self.llm.system_prompt = prompt;
        }

        if !overlay.apps.is_empty() {
            self.apps.extend(
                overlay
                    .apps
                    .into_iter()
                    .map(|(name, cmd)| (name.to_lowercase(), cmd)),
            );
        }
    }

    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("LUMEN_STT_API_KEY") {
            self.stt.api_key = Some(key);
        }
        if let Ok(key) = std::env::var("LUMEN_TTS_API_KEY") {
            self.tts.api_key = Some(key);
        }
        if let Ok(key) = std::env::var("LUMEN_LLM_API_KEY") {
            self.llm.api_key = Some(key);
        }
    }
}

/// Path to the user config file
#[must_use]
pub fn config_file_path() -> PathBuf {
    ProjectDirs::from("", "", "lumen").map_or_else(
        || PathBuf::from("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Data directory for the memory file and other state
#[must_use]
pub fn data_dir() -> PathBuf {
    ProjectDirs::from("", "", "lumen")
        .map_or_else(|| PathBuf::from("."), |dirs| dirs.data_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.wake_phrase, "lumen wake up");
        assert_eq!(config.sleep_timeout, Duration::from_secs(120));
        assert!((config.capture.silence_threshold - 400.0).abs() < f32::EPSILON);
        assert!(config.llm.url.contains("/chat/completions"));
    }

    #[test]
    fn file_overlay_merges_over_defaults() {
        let overlay: LumenConfigFile = toml::from_str(
            r#"
            [assistant]
            wake_phrase = "Hey Lumen"
            sleep_timeout_secs = 300

            [capture]
            silence_threshold = 250.0

            [llm]
            model = "qwen2.5-7b-instruct"

            [apps]
            Browser = "firefox"
            "#,
        )
        .unwrap();

        let mut config = Config::default();
        config.apply_file(overlay);

        assert_eq!(config.wake_phrase, "hey lumen");
        assert_eq!(config.sleep_timeout, Duration::from_secs(300));
        assert!((config.capture.silence_threshold - 250.0).abs() < f32::EPSILON);
        assert_eq!(config.llm.model, "qwen2.5-7b-instruct");
        // Defaults survive where the file is silent
        assert!((config.capture.silence_duration_secs - 1.8).abs() < f32::EPSILON);
        assert_eq!(config.apps["browser"], "firefox");
    }
}
