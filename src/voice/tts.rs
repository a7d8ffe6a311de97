//! Text-to-speech client and speech queue
//!
//! Synthesis goes through the [`Synthesizer`] trait; [`HttpSynthesizer`]
//! requests WAV audio from an OpenAI-compatible `/audio/speech` endpoint
//! and splits it into fixed chunks so playback can be interrupted between
//! them. [`Speaker`] is the cloneable handle the loop and skill handlers
//! use to enqueue speech; one consumer task serializes synthesis and
//! playback so audio output never interleaves.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::voice::playback::play_chunks;
use crate::{Error, Result};

/// Samples per playback chunk (interrupt granularity)
const CHUNK_SAMPLES: usize = 2048;

/// Synthesized speech, chunked for interruptible playback
#[derive(Debug, Clone)]
pub struct SpeechAudio {
    /// Sample rate of the decoded audio
    pub sample_rate: u32,
    /// Mono f32 samples in playback order
    pub chunks: Vec<Vec<f32>>,
}

/// Converts text to speech audio
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize `text` into chunked audio
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails
    async fn synthesize(&self, text: &str) -> Result<SpeechAudio>;
}

/// HTTP synthesizer against an OpenAI-compatible endpoint
pub struct HttpSynthesizer {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    model: String,
    voice: String,
}

impl HttpSynthesizer {
    /// Create a synthesizer for `url` (the full speech endpoint)
    #[must_use]
    pub fn new(url: String, api_key: Option<String>, model: String, voice: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            api_key,
            model,
            voice,
        }
    }
}

#[async_trait]
impl Synthesizer for HttpSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<SpeechAudio> {
        #[derive(serde::Serialize)]
        struct SpeechRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            response_format: &'a str,
        }

        let request = SpeechRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            response_format: "wav",
        };

        let mut req = self.client.post(&self.url).json(&request);
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {key}"));
        }

        let response = req.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("speech API error {status}: {body}")));
        }

        let bytes = response.bytes().await?;
        decode_wav(&bytes)
    }
}

/// Decode WAV bytes into chunked mono f32 samples
fn decode_wav(bytes: &[u8]) -> Result<SpeechAudio> {
    let mut reader = hound::WavReader::new(std::io::Cursor::new(bytes))
        .map_err(|e| Error::Tts(format!("WAV decode error: {e}")))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => reader
            .samples::<i16>()
            .step_by(channels)
            .map(|s| s.map(|v| f32::from(v) / 32768.0))
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Tts(format!("WAV decode error: {e}")))?,
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .step_by(channels)
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Tts(format!("WAV decode error: {e}")))?,
    };

    let chunks = samples
        .chunks(CHUNK_SAMPLES)
        .map(<[f32]>::to_vec)
        .collect();

    Ok(SpeechAudio {
        sample_rate: spec.sample_rate,
        chunks,
    })
}

/// Cloneable handle that enqueues text for sequential speech output
#[derive(Clone)]
pub struct Speaker {
    tx: mpsc::UnboundedSender<String>,
}

impl Speaker {
    /// Spawn the speech consumer task and return its handle
    ///
    /// The task synthesizes each queued text and plays it chunk by chunk,
    /// honoring the stop-speaking flag between chunks. Failures are logged
    /// and the queue keeps draining.
    #[must_use]
    pub fn spawn(synthesizer: Arc<dyn Synthesizer>, stop_speaking: Arc<AtomicBool>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            while let Some(text) = rx.recv().await {
                if text.trim().is_empty() {
                    continue;
                }
                // A fresh request clears a leftover interrupt
                stop_speaking.store(false, Ordering::SeqCst);

                let audio = match synthesizer.synthesize(&text).await {
                    Ok(audio) => audio,
                    Err(e) => {
                        tracing::error!(error = %e, "speech synthesis failed");
                        continue;
                    }
                };

                let stop = Arc::clone(&stop_speaking);
                let result = tokio::task::spawn_blocking(move || {
                    play_chunks(audio.sample_rate, &audio.chunks, &stop)
                })
                .await;

                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::error!(error = %e, "speech playback failed"),
                    Err(e) => tracing::error!(error = %e, "speech playback task failed"),
                }
            }
        });

        Self { tx }
    }

    /// Create a speaker whose queue is never consumed (tests)
    #[must_use]
    pub fn disconnected() -> Self {
        let (tx, _rx) = mpsc::unbounded_channel();
        Self { tx }
    }

    /// Enqueue text for speech output
    pub fn say(&self, text: impl Into<String>) {
        let text = text.into();
        tracing::debug!(text = %text, "queueing speech");
        if self.tx.send(text).is_err() {
            tracing::warn!("speech queue closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wav_decoding_chunks_mono() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 22050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for i in 0..5000i16 {
                writer.write_sample(i).unwrap();
            }
            writer.finalize().unwrap();
        }

        let audio = decode_wav(&cursor.into_inner()).unwrap();
        assert_eq!(audio.sample_rate, 22050);
        let total: usize = audio.chunks.iter().map(Vec::len).sum();
        assert_eq!(total, 5000);
        assert!(audio.chunks.len() > 1);
        assert!(audio.chunks.iter().all(|c| c.len() <= CHUNK_SAMPLES));
    }

    #[test]
    fn wav_decoding_rejects_garbage() {
        assert!(decode_wav(b"not a wav file").is_err());
    }
}
