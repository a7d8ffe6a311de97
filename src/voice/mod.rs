//! Voice processing module
//!
//! Handles microphone capture with energy-based VAD, transcript
//! filtering, speech playback, and the STT/TTS client traits.

pub mod capture;
pub mod filter;
pub mod playback;
pub mod stt;
pub mod tts;

pub use capture::{CaptureConfig, TARGET_SAMPLE_RATE, VadSession, samples_to_wav};
pub use filter::is_hallucination;
pub use playback::play_chunks;
pub use stt::{HttpTranscriber, Transcriber};
pub use tts::{HttpSynthesizer, Speaker, SpeechAudio, Synthesizer};
