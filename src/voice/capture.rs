//! Microphone capture with energy-based voice activity detection
//!
//! The capture pipeline records until the speaker goes quiet: every frame's
//! RMS energy is compared against a threshold, and the utterance is
//! finalized once speech was heard, a silence tail has elapsed, and a
//! minimum duration has been recorded. The VAD itself ([`VadSession`]) is a
//! pure state machine over i16 frames so it can be tested without hardware;
//! [`capture_utterance`] wires it to a cpal input stream.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, StreamConfig};

use crate::{Error, Result, audio};

/// Sample rate utterances are delivered at (16kHz for speech models)
pub const TARGET_SAMPLE_RATE: u32 = 16000;

/// Samples per analysis frame
pub const FRAME_SIZE: usize = 1024;

/// Attempts to open the input stream before giving up
const OPEN_RETRIES: u32 = 3;

/// Delay between open attempts
const OPEN_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Tuning for the energy-based VAD
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// RMS energy threshold in the i16 sample domain
    pub silence_threshold: f32,
    /// Trailing silence that finalizes an utterance, in seconds
    pub silence_duration_secs: f32,
    /// Minimum recording length before finalization is allowed, in seconds
    pub min_record_secs: f32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            silence_threshold: 400.0,
            silence_duration_secs: 1.8,
            min_record_secs: 0.4,
        }
    }
}

/// Pure VAD state machine over fixed-size i16 frames
///
/// Feed frames with [`push_frame`](Self::push_frame) until it reports the
/// utterance is complete, then call [`finish`](Self::finish) to get the
/// normalized 16kHz mono waveform.
pub struct VadSession {
    cfg: CaptureConfig,
    sample_rate: u32,
    channels: u16,
    samples: Vec<i16>,
    speech_detected: bool,
    silent_frames: u32,
    total_frames: u32,
    silence_frames_needed: u32,
    min_frames: u32,
}

impl VadSession {
    /// Create a session for a stream at `sample_rate` with `channels`
    /// interleaved channels
    #[must_use]
    pub fn new(cfg: CaptureConfig, sample_rate: u32, channels: u16) -> Self {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
        let silence_frames_needed = (cfg.silence_duration_secs * sample_rate as f32
            / FRAME_SIZE as f32)
            .max(1.0) as u32;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
        let min_frames = (cfg.min_record_secs * sample_rate as f32 / FRAME_SIZE as f32) as u32;

        Self {
            cfg,
            sample_rate,
            channels: channels.max(1),
            samples: Vec::new(),
            speech_detected: false,
            silent_frames: 0,
            total_frames: 0,
            silence_frames_needed,
            min_frames,
        }
    }

    /// Push one interleaved frame; returns `true` once the utterance is
    /// complete and no more frames are needed
    pub fn push_frame(&mut self, frame: &[i16]) -> bool {
        // Multi-channel input is downmixed by keeping the first channel
        let mono: Vec<i16> = frame
            .iter()
            .step_by(self.channels as usize)
            .copied()
            .collect();

        let energy = rms(&mono);
        if energy > self.cfg.silence_threshold {
            self.speech_detected = true;
            self.silent_frames = 0;
        } else {
            self.silent_frames += 1;
        }

        self.samples.extend_from_slice(&mono);
        self.total_frames += 1;

        self.is_complete()
    }

    /// Whether the finalize condition holds
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.speech_detected
            && self.silent_frames >= self.silence_frames_needed
            && self.total_frames >= self.min_frames
    }

    /// Whether any frame has crossed the energy threshold yet
    #[must_use]
    pub const fn speech_detected(&self) -> bool {
        self.speech_detected
    }

    /// Consume the session, returning the normalized 16kHz waveform, or
    /// `None` if no speech was ever detected
    #[must_use]
    pub fn finish(self) -> Option<Vec<f32>> {
        if !self.speech_detected {
            return None;
        }

        let normalized: Vec<f32> = self
            .samples
            .iter()
            .map(|&s| f32::from(s) / 32768.0)
            .collect();

        if self.sample_rate == TARGET_SAMPLE_RATE {
            Some(normalized)
        } else {
            Some(resample_linear(
                &normalized,
                self.sample_rate,
                TARGET_SAMPLE_RATE,
            ))
        }
    }
}

/// Compute the RMS energy of i16 samples
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    (sum / samples.len() as f64).sqrt() as f32
}

/// Linear-interpolation resampler
///
/// Output length is `len * to / from`; each output sample interpolates
/// between the two nearest input samples.
#[must_use]
pub fn resample_linear(samples: &[f32], from: u32, to: u32) -> Vec<f32> {
    if samples.is_empty() || from == to {
        return samples.to_vec();
    }

    let out_len = samples.len() * to as usize / from as usize;
    if out_len == 0 {
        return Vec::new();
    }
    if samples.len() == 1 || out_len == 1 {
        return vec![samples[0]; out_len];
    }

    #[allow(clippy::cast_precision_loss)]
    let step = (samples.len() - 1) as f64 / (out_len - 1) as f64;
    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        #[allow(clippy::cast_precision_loss)]
        let pos = i as f64 * step;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let idx = pos.floor() as usize;
        let frac = pos - pos.floor();
        let next = (idx + 1).min(samples.len() - 1);
        #[allow(clippy::cast_possible_truncation)]
        let value =
            (f64::from(samples[idx]) * (1.0 - frac) + f64::from(samples[next]) * frac) as f32;
        out.push(value);
    }
    out
}

/// Record one utterance from the default microphone
///
/// Opens the input stream (16kHz mono preferred, device native config
/// otherwise, with up to three attempts two seconds apart), feeds frames
/// through the VAD, and returns the normalized 16kHz waveform. Returns an
/// empty vec if no speech was detected or the stop flag was raised before
/// speech ended.
///
/// # Errors
///
/// Returns error if the input stream cannot be opened after all retries.
pub fn capture_utterance(cfg: &CaptureConfig, stop: &Arc<AtomicBool>) -> Result<Vec<f32>> {
    let mut last_err = None;
    for attempt in 1..=OPEN_RETRIES {
        match open_and_record(cfg, stop) {
            Ok(samples) => return Ok(samples),
            Err(e) => {
                tracing::warn!(attempt, error = %e, "failed to open input stream");
                last_err = Some(e);
                if attempt < OPEN_RETRIES {
                    std::thread::sleep(OPEN_RETRY_DELAY);
                }
            }
        }
    }
    Err(last_err.unwrap_or_else(|| Error::Audio("input stream unavailable".to_string())))
}

fn open_and_record(cfg: &CaptureConfig, stop: &Arc<AtomicBool>) -> Result<Vec<f32>> {
    let device = audio::input_device()?;
    let (config, sample_format) = negotiate_input_config(&device)?;
    let sample_rate = config.sample_rate.0;
    let channels = config.channels;

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        sample_rate,
        channels,
        "listening"
    );

    let (tx, rx) = mpsc::channel::<Vec<i16>>();
    let frame_len = FRAME_SIZE * channels as usize;

    let err_fn = |err| {
        // Transient read errors are skipped, not fatal
        tracing::warn!(error = %err, "input stream error");
    };

    let stream = if sample_format == SampleFormat::I16 {
        let mut pending: Vec<i16> = Vec::with_capacity(frame_len);
        device
            .build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    pending.extend_from_slice(data);
                    while pending.len() >= frame_len {
                        let frame: Vec<i16> = pending.drain(..frame_len).collect();
                        let _ = tx.send(frame);
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?
    } else {
        let mut pending: Vec<i16> = Vec::with_capacity(frame_len);
        device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    #[allow(clippy::cast_possible_truncation)]
                    pending.extend(
                        data.iter()
                            .map(|&s| (s * 32767.0).clamp(-32768.0, 32767.0) as i16),
                    );
                    while pending.len() >= frame_len {
                        let frame: Vec<i16> = pending.drain(..frame_len).collect();
                        let _ = tx.send(frame);
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?
    };

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;

    let session = VadSession::new(cfg.clone(), sample_rate, channels);
    let samples = run_vad_loop(session, &rx, stop);
    drop(stream);
    samples
}

/// Feed received frames through the VAD until the utterance completes
///
/// A raised stop flag aborts capture mid-utterance and returns empty,
/// discarding whatever was already recorded.
fn run_vad_loop(
    mut session: VadSession,
    rx: &mpsc::Receiver<Vec<i16>>,
    stop: &AtomicBool,
) -> Result<Vec<f32>> {
    loop {
        if stop.load(Ordering::SeqCst) {
            tracing::debug!("capture interrupted");
            return Ok(Vec::new());
        }

        match rx.recv_timeout(Duration::from_millis(250)) {
            Ok(frame) => {
                if session.push_frame(&frame) {
                    return Ok(session.finish().unwrap_or_default());
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                return Err(Error::Audio("input stream closed".to_string()));
            }
        }
    }
}

/// Pick an input config: 16kHz mono first, then the device default
fn negotiate_input_config(device: &cpal::Device) -> Result<(StreamConfig, SampleFormat)> {
    let preferred = device
        .supported_input_configs()
        .ok()
        .and_then(|mut configs| {
            configs
                .find(|c| {
                    c.channels() == 1
                        && c.min_sample_rate() <= SampleRate(TARGET_SAMPLE_RATE)
                        && c.max_sample_rate() >= SampleRate(TARGET_SAMPLE_RATE)
                        && matches!(c.sample_format(), SampleFormat::I16 | SampleFormat::F32)
                })
                .map(|c| c.with_sample_rate(SampleRate(TARGET_SAMPLE_RATE)))
        });

    let supported = match preferred {
        Some(c) => c,
        None => device
            .default_input_config()
            .map_err(|e| Error::Audio(e.to_string()))?,
    };

    let format = supported.sample_format();
    Ok((supported.config(), format))
}

/// Convert f32 samples to WAV bytes for STT uploads
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
