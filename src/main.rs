use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use lumen_assistant::voice::capture::{CaptureConfig, capture_utterance, rms};
use lumen_assistant::voice::playback::play_samples;
use lumen_assistant::voice::tts::{HttpSynthesizer, Synthesizer};
use lumen_assistant::{Config, Daemon};

/// Lumen - voice-driven personal assistant
#[derive(Parser)]
#[command(name = "lumen", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
#[allow(clippy::enum_variant_names)]
enum Command {
    /// Test microphone input with the voice activity detector
    TestMic,
    /// Test speaker output
    TestSpeaker,
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,lumen_assistant=info",
        1 => "info,lumen_assistant=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic => test_mic().await,
            Command::TestSpeaker => test_speaker().await,
            Command::TestTts { text } => test_tts(&text).await,
        };
    }

    let config = Config::load()?;
    tracing::debug!(?config, "loaded configuration");

    let daemon = Daemon::new(config);
    daemon.run().await?;

    Ok(())
}

/// Test microphone input: record one VAD-gated utterance and report it
async fn test_mic() -> anyhow::Result<()> {
    println!("Testing microphone...");
    println!("Speak a sentence, then stay quiet for about two seconds.\n");

    let cfg = CaptureConfig::default();
    let stop = Arc::new(AtomicBool::new(false));
    let samples =
        tokio::task::spawn_blocking(move || capture_utterance(&cfg, &stop)).await??;

    if samples.is_empty() {
        println!("No speech detected.");
        println!("If you were speaking, check:");
        println!("  1. Is your mic plugged in?");
        println!("  2. Run: pactl info | grep 'Default Source'");
        println!("  3. Run: arecord -l (to list devices)");
        return Ok(());
    }

    #[allow(clippy::cast_possible_truncation)]
    let as_i16: Vec<i16> = samples
        .iter()
        .map(|&s| (s * 32767.0).clamp(-32768.0, 32767.0) as i16)
        .collect();
    let energy = rms(&as_i16);
    #[allow(clippy::cast_precision_loss)]
    let seconds = samples.len() as f32 / 16000.0;

    println!("Captured {:.1}s of speech ({} samples)", seconds, samples.len());
    println!("RMS energy: {energy:.0}");
    println!("\nIf the duration matches what you said, your mic is working!");

    Ok(())
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let sample_rate = 24000_u32;
    let frequency = 440.0_f32;
    let duration_secs = 2.0_f32;
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let num_samples = (sample_rate as f32 * duration_secs) as usize;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    println!("Playing {} samples at {sample_rate} Hz...", samples.len());
    tokio::task::spawn_blocking(move || play_samples(sample_rate, samples)).await??;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Try: pavucontrol (to check output levels)");

    Ok(())
}

/// Test TTS synthesis and playback
async fn test_tts(text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let config = Config::load()?;
    let synthesizer = HttpSynthesizer::new(
        config.tts.url.clone(),
        config.tts.api_key.clone(),
        config.tts.model.clone(),
        config.tts.voice.clone(),
    );

    println!("Synthesizing speech...");
    let audio = synthesizer.synthesize(text).await?;
    let total: usize = audio.chunks.iter().map(Vec::len).sum();
    println!("Got {total} samples at {} Hz", audio.sample_rate);

    println!("Playing audio...");
    let stop = Arc::new(AtomicBool::new(false));
    tokio::task::spawn_blocking(move || {
        lumen_assistant::voice::playback::play_chunks(audio.sample_rate, &audio.chunks, &stop)
    })
    .await??;

    println!("\n---");
    println!("If you heard the speech, TTS is working!");

    Ok(())
}
