//! Daemon - the voice assistant service
//!
//! Owns the single orchestration loop: capture an utterance, transcribe,
//! filter, gate on wake state, absorb clarification answers, classify,
//! then dispatch a skill or speak the chat response. Skill handlers run
//! supervised on blocking workers so a crashing skill never takes the
//! loop down.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::Config;
use crate::llm::{ClassifierOutput, HttpClassifier, IntentClassifier};
use crate::memory::MemoryStore;
use crate::sanitize::sanitize_for_tts;
use crate::session::SessionMemory;
use crate::skills::{self, SkillContext, SkillRegistry};
use crate::voice::capture::{TARGET_SAMPLE_RATE, capture_utterance};
use crate::voice::filter::is_hallucination;
use crate::voice::stt::{HttpTranscriber, Transcriber};
use crate::voice::tts::{HttpSynthesizer, Speaker};
use crate::wake::WakeState;
use crate::{Error, Result};

/// The Lumen daemon
pub struct Daemon {
    config: Config,
    wake: WakeState,
    session: SessionMemory,
    registry: SkillRegistry,
    transcriber: Arc<dyn Transcriber>,
    classifier: Arc<dyn IntentClassifier>,
    memory: MemoryStore,
    speaker: Speaker,
    stop_listening: Arc<AtomicBool>,
    stop_speaking: Arc<AtomicBool>,
}

impl Daemon {
    /// Create a daemon with the default HTTP engines
    ///
    /// Must be called inside a tokio runtime; the speech queue task is
    /// spawned here.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let transcriber: Arc<dyn Transcriber> = Arc::new(HttpTranscriber::new(
            config.stt.url.clone(),
            config.stt.api_key.clone(),
            config.stt.model.clone(),
        ));
        let classifier: Arc<dyn IntentClassifier> = Arc::new(HttpClassifier::new(
            config.llm.url.clone(),
            config.llm.api_key.clone(),
            config.llm.model.clone(),
            config.llm.system_prompt.clone(),
        ));
        let synthesizer = Arc::new(HttpSynthesizer::new(
            config.tts.url.clone(),
            config.tts.api_key.clone(),
            config.tts.model.clone(),
            config.tts.voice.clone(),
        ));

        let stop_speaking = Arc::new(AtomicBool::new(false));
        let speaker = Speaker::spawn(synthesizer, Arc::clone(&stop_speaking));

        Self::with_engines(config, transcriber, classifier, speaker, stop_speaking)
    }

    /// Create a daemon with explicit engines (tests use mocks here)
    #[must_use]
    pub fn with_engines(
        config: Config,
        transcriber: Arc<dyn Transcriber>,
        classifier: Arc<dyn IntentClassifier>,
        speaker: Speaker,
        stop_speaking: Arc<AtomicBool>,
    ) -> Self {
        let mut registry = SkillRegistry::new();
        registry.register(skills::date::skill());
        registry.register(skills::weather::skill());
        registry.register(skills::search::skill());
        registry.register(skills::open_app::skill(config.apps.clone()));
        registry.register(skills::send_message::skill());

        let memory = MemoryStore::new(config.memory_path.clone());
        let wake = WakeState::new(config.sleep_timeout);

        Self {
            config,
            wake,
            session: SessionMemory::new(),
            registry,
            transcriber,
            classifier,
            memory,
            speaker,
            stop_listening: Arc::new(AtomicBool::new(false)),
            stop_speaking,
        }
    }

    /// Replace the skill registry (callers can add or override skills)
    pub fn set_registry(&mut self, registry: SkillRegistry) {
        self.registry = registry;
    }

    /// Dialogue session handle
    #[must_use]
    pub fn session(&self) -> &SessionMemory {
        &self.session
    }

    /// Wake state, for inspection
    #[must_use]
    pub fn wake(&self) -> &WakeState {
        &self.wake
    }

    /// Apply the inactivity timeout; returns `true` if it put the
    /// assistant to sleep
    ///
    /// Runs at the start of every transcript, so the utterance that ends
    /// a long silence is gated by the asleep state instead of being
    /// processed as a command.
    pub fn check_sleep_timeout(&mut self) -> bool {
        self.wake.check_timeout()
    }

    /// Run the daemon until interrupted
    ///
    /// # Errors
    ///
    /// Returns error if the microphone is unavailable at startup.
    pub async fn run(mut self) -> Result<()> {
        tracing::info!(
            wake_phrase = %self.config.wake_phrase,
            "daemon running, say the wake phrase to begin"
        );

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("shutdown requested");
                    self.stop_listening.store(true, Ordering::SeqCst);
                    self.stop_speaking.store(true, Ordering::SeqCst);
                    break;
                }
                result = self.iteration() => {
                    if let Err(e) = result {
                        tracing::error!(error = %e, "loop iteration failed");
                    }
                }
            }
        }

        Ok(())
    }

    /// One loop iteration: capture, transcribe, filter, process
    async fn iteration(&mut self) -> Result<()> {
        self.stop_listening.store(false, Ordering::SeqCst);
        let capture_cfg = self.config.capture.clone();
        let stop = Arc::clone(&self.stop_listening);
        let samples = tokio::task::spawn_blocking(move || capture_utterance(&capture_cfg, &stop))
            .await
            .map_err(|e| Error::Audio(e.to_string()))??;

        if samples.is_empty() {
            return Ok(());
        }

        let text = match self
            .transcriber
            .transcribe(&samples, TARGET_SAMPLE_RATE)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "transcription failed");
                return Ok(());
            }
        };

        if is_hallucination(&text) {
            tracing::debug!(text = %text, "transcript filtered");
            return Ok(());
        }

        self.handle_transcript(&text).await
    }

    /// Process one filtered transcript through wake gating, clarification,
    /// classification, and dispatch
    ///
    /// # Errors
    ///
    /// Returns error only on unrecoverable internal failures; engine
    /// problems degrade to spoken notices.
    pub async fn handle_transcript(&mut self, raw: &str) -> Result<()> {
        // The timeout is observed before this utterance is treated as a
        // command; the utterance that breaks a long silence must not be
        // processed as if the assistant were still awake
        if self.check_sleep_timeout() {
            self.speaker.say("I've gone to sleep due to inactivity.");
        }

        let text = raw.trim();
        let cleaned = clean_command(text);

        // Interrupts are honored in any state: silence playback and drop
        // the exchange
        if self.config.interrupt_commands.iter().any(|c| cleaned.contains(c.as_str())) {
            tracing::info!(command = %cleaned, "interrupt");
            self.stop_speaking.store(true, Ordering::SeqCst);
            self.session.clear();
            return Ok(());
        }

        if !self.wake.is_awake() {
            if cleaned.contains(&self.config.wake_phrase) {
                self.wake.wake_up();
                self.speaker.say("I'm listening.");
                // A command tacked onto the wake phrase is processed
                // immediately
                let rest = after_phrase(text, &self.config.wake_phrase);
                if !rest.is_empty() {
                    return Box::pin(self.handle_transcript(&rest)).await;
                }
            } else {
                tracing::debug!(text = %text, "asleep, ignoring");
            }
            return Ok(());
        }

        if self.config.sleep_commands.iter().any(|c| cleaned.contains(c.as_str())) {
            self.wake.sleep_now();
            self.stop_speaking.store(true, Ordering::SeqCst);
            self.session.clear();
            self.speaker.say("Going to sleep.");
            return Ok(());
        }

        self.wake.touch();

        // A pending clarification absorbs this utterance as the answer,
        // then the original request becomes the active text again
        let active_text = if let Some(param) = self.session.current_question() {
            tracing::debug!(param = %param, answer = %text, "clarification answered");
            self.session.set_parameter(param, text);
            self.session.clear_current_question();
            self.session.last_user_text().unwrap_or_else(|| text.to_string())
        } else {
            self.session.set_last_user_text(text);
            text.to_string()
        };

        let context = self.build_context();
        let output = match self.classifier.classify(&active_text, &context).await {
            Ok(output) => output,
            Err(e) => {
                tracing::error!(error = %e, "classification failed");
                self.speaker
                    .say("Something went wrong while thinking about that.");
                return Ok(());
            }
        };

        // The model call may have taken a while; it still counts as
        // activity
        self.wake.touch();

        self.session.push_history(format!("User: {text}"));

        if output.offline {
            self.speaker.say(output.text.clone());
            return Ok(());
        }

        if let Some(update) = &output.memory_update {
            if let Err(e) = self.memory.update(update) {
                tracing::warn!(error = %e, "memory update failed");
            }
        }

        self.process_output(output).await
    }

    /// Route a classifier output to a skill or to chat
    async fn process_output(&mut self, output: ClassifierOutput) -> Result<()> {
        // A continuing collection keeps its intent even when the model
        // re-classifies the restored text differently
        let intent = if self.registry.has(&output.intent) && output.intent != "chat" {
            output.intent.clone()
        } else if let Some(pending) = self.session.pending_intent() {
            pending
        } else {
            output.intent.clone()
        };

        let Some(skill) = self.registry.get(&intent) else {
            let spoken = sanitize_for_tts(&output.text);
            if spoken.is_empty() {
                tracing::debug!(intent = %intent, "nothing speakable in response");
            } else {
                self.session.set_last_ai_response(spoken.clone());
                self.session.push_history(format!("Lumen: {spoken}"));
                self.speaker.say(spoken);
            }
            return Ok(());
        };

        self.session.merge_parameters(&output.parameters);
        let collected = self.session.parameters();

        if let Some(missing) = skill.first_missing_param(&collected) {
            tracing::info!(intent = %intent, param = %missing.name, "asking for missing parameter");
            self.session.set_pending_intent(&intent);
            self.session.set_current_question(&missing.name);
            self.session.push_history(format!("Lumen: {}", missing.prompt));
            self.speaker.say(missing.prompt.clone());
            return Ok(());
        }

        tracing::info!(intent = %intent, "dispatching skill");
        let ctx = SkillContext {
            parameters: collected,
            response: sanitize_for_tts(&output.text),
            speaker: self.speaker.clone(),
            session: self.session.clone(),
        };

        if let Some(supervisor) = self.registry.dispatch(&intent, ctx) {
            // The supervisor never propagates handler panics or errors
            let _ = supervisor.await;
        }
        Ok(())
    }

    /// Compact context injected into the classifier prompt
    fn build_context(&self) -> BTreeMap<String, String> {
        let mut context = self.memory.minimal_context();

        if let Some(intent) = self.session.pending_intent() {
            context.insert("_pending_intent".to_string(), intent);
            if let Ok(params) = serde_json::to_string(&self.session.parameters()) {
                context.insert("_collected_params".to_string(), params);
            }
        }

        let history = self.session.recent_history();
        if !history.is_empty() {
            context.insert("recent_conversation".to_string(), history.join(" | "));
        }

        context
    }
}

/// Lowercase, trim, and strip trailing punctuation for command matching
fn clean_command(text: &str) -> String {
    text.to_lowercase()
        .trim()
        .trim_end_matches(['.', '!', '?', ',', ';', ':'])
        .to_string()
}

/// Text following the wake phrase, if any
///
/// Matching is case-insensitive over the original text; lowercasing can
/// change byte lengths, so the remainder is located by walking char
/// boundaries instead of reusing an offset found in a lowercased copy.
fn after_phrase(text: &str, phrase: &str) -> String {
    if phrase.is_empty() {
        return String::new();
    }
    for (start, _) in text.char_indices() {
        if let Some(rest) = strip_phrase_prefix(&text[start..], phrase) {
            return rest
                .trim_start_matches(|c: char| c.is_whitespace() || c == ',' || c == '.')
                .to_string();
        }
    }
    String::new()
}

/// Strip a lowercase `phrase` from the start of `text`, ignoring case
fn strip_phrase_prefix<'a>(text: &'a str, phrase: &str) -> Option<&'a str> {
    let mut phrase_chars = phrase.chars().peekable();
    for (i, c) in text.char_indices() {
        for lowered in c.to_lowercase() {
            if phrase_chars.next() != Some(lowered) {
                return None;
            }
        }
        if phrase_chars.peek().is_none() {
            return Some(&text[i + c.len_utf8()..]);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_cleaning() {
        assert_eq!(clean_command("  Stop!  "), "stop");
        assert_eq!(clean_command("Go to sleep."), "go to sleep");
    }

    #[test]
    fn text_after_wake_phrase() {
        assert_eq!(
            after_phrase("Lumen wake up, what's the weather?", "lumen wake up"),
            "what's the weather?"
        );
        assert_eq!(after_phrase("Lumen wake up", "lumen wake up"), "");
        assert_eq!(after_phrase("unrelated", "lumen wake up"), "");
    }

    #[test]
    fn wake_phrase_extraction_survives_multibyte_text() {
        // "İ" lowercases to two chars, so byte offsets from a lowercased
        // copy don't line up with the original text
        assert_eq!(
            after_phrase("İ Lumen wake up, öffne den Browser", "lumen wake up"),
            "öffne den Browser"
        );
        assert_eq!(after_phrase("İ lumen wake up", "lumen wake up"), "");
    }
}
