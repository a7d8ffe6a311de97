//! Chunked speech playback
//!
//! Synthesized audio arrives as fixed-size chunks; chunks are queued to the
//! output stream one at a time with the stop-speaking flag checked between
//! them, so an interrupt cuts playback at the next chunk boundary instead
//! of waiting for the whole response.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use crate::{Error, Result, audio};

/// Play audio chunks at `sample_rate`, stopping between chunks when `stop`
/// is raised
///
/// # Errors
///
/// Returns error if the output stream cannot be opened.
pub fn play_chunks(sample_rate: u32, chunks: &[Vec<f32>], stop: &Arc<AtomicBool>) -> Result<()> {
    if chunks.iter().all(Vec::is_empty) {
        return Ok(());
    }

    let device = audio::output_device()?;
    let config = negotiate_output_config(&device, sample_rate)?;
    let channels = config.channels as usize;

    let queue: Arc<Mutex<VecDeque<f32>>> = Arc::new(Mutex::new(VecDeque::new()));
    let queue_cb = Arc::clone(&queue);

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut q = match queue_cb.lock() {
                    Ok(q) => q,
                    Err(_) => return,
                };
                for frame in data.chunks_mut(channels) {
                    let sample = q.pop_front().unwrap_or(0.0);
                    for out in frame.iter_mut() {
                        *out = sample;
                    }
                }
            },
            |err| {
                tracing::error!(error = %err, "output stream error");
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))?;

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;

    for chunk in chunks {
        if stop.load(Ordering::SeqCst) {
            tracing::debug!("playback interrupted");
            if let Ok(mut q) = queue.lock() {
                q.clear();
            }
            break;
        }

        if let Ok(mut q) = queue.lock() {
            q.extend(chunk.iter().copied());
        }

        // Wait for the chunk to mostly drain before queueing the next, so
        // the stop flag takes effect at chunk granularity
        loop {
            let backlog = queue.lock().map(|q| q.len()).unwrap_or(0);
            if backlog <= chunk.len() / 4 || stop.load(Ordering::SeqCst) {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    // Let the tail drain
    loop {
        let backlog = queue.lock().map(|q| q.len()).unwrap_or(0);
        if backlog == 0 || stop.load(Ordering::SeqCst) {
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    std::thread::sleep(Duration::from_millis(50));

    drop(stream);
    Ok(())
}

/// Play a bare sample buffer as a single chunk (diagnostics)
///
/// # Errors
///
/// Returns error if the output stream cannot be opened.
pub fn play_samples(sample_rate: u32, samples: Vec<f32>) -> Result<()> {
    let stop = Arc::new(AtomicBool::new(false));
    play_chunks(sample_rate, &[samples], &stop)
}

/// Pick an output config at the requested rate, mono first then stereo
fn negotiate_output_config(device: &cpal::Device, sample_rate: u32) -> Result<StreamConfig> {
    let supported = device
        .supported_output_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .find(|c| {
            c.channels() == 1
                && c.min_sample_rate() <= SampleRate(sample_rate)
                && c.max_sample_rate() >= SampleRate(sample_rate)
        })
        .or_else(|| {
            device.supported_output_configs().ok()?.find(|c| {
                c.channels() == 2
                    && c.min_sample_rate() <= SampleRate(sample_rate)
                    && c.max_sample_rate() >= SampleRate(sample_rate)
            })
        })
        .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

    Ok(supported.with_sample_rate(SampleRate(sample_rate)).config())
}
