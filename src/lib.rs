//! Lumen - Voice-driven personal assistant orchestrator
//!
//! This library provides the core pipeline of the Lumen assistant:
//! - Voice capture with energy-based VAD and transcript filtering
//! - Wake/sleep state management
//! - Dialogue memory with slot-filling clarification
//! - Skill registry with crash-isolated dispatch
//! - HTTP clients for speech-to-text, text-to-speech and intent
//!   classification against OpenAI-compatible local servers
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Microphone                        │
//! └────────────────────┬────────────────────────────────┘
//!                      │ VAD capture + filter
//! ┌────────────────────▼────────────────────────────────┐
//! │              Orchestration loop                      │
//! │  Wake/Sleep │ Dialogue memory │ Slot-filling        │
//! └───────┬─────────────────┬───────────────────────────┘
//!         │ classify        │ dispatch
//! ┌───────▼────────┐ ┌──────▼──────────────────────────┐
//! │ Intent model   │ │ Skills (date, weather, apps...) │
//! └────────────────┘ └──────────────┬──────────────────┘
//!                                   │ speak
//! ┌─────────────────────────────────▼───────────────────┐
//! │              Speech queue → TTS → Speaker            │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod config;
pub mod daemon;
pub mod error;
pub mod llm;
pub mod memory;
pub mod sanitize;
pub mod session;
pub mod skills;
pub mod voice;
pub mod wake;

pub use config::Config;
pub use daemon::Daemon;
pub use error::{Error, Result};
pub use llm::{ClassifierOutput, HttpClassifier, IntentClassifier};
pub use memory::MemoryStore;
pub use sanitize::sanitize_for_tts;
pub use session::SessionMemory;
pub use skills::{RequiredParam, Skill, SkillContext, SkillHandler, SkillRegistry};
pub use voice::capture::{CaptureConfig, VadSession};
pub use voice::filter::is_hallucination;
pub use voice::stt::{HttpTranscriber, Transcriber};
pub use voice::tts::{HttpSynthesizer, Speaker, SpeechAudio, Synthesizer};
pub use wake::WakeState;
