//! Orchestration loop integration tests
//!
//! Drives the transcript-processing path with scripted engines, no audio
//! hardware or model server involved.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use lumen_assistant::skills::{RequiredParam, Skill, SkillContext, SkillRegistry};
use lumen_assistant::voice::tts::Speaker;
use lumen_assistant::{
    ClassifierOutput, Config, Daemon, IntentClassifier, Result, Transcriber, skills,
};

/// Transcriber stand-in; the tests feed transcripts directly
struct NullTranscriber;

#[async_trait]
impl Transcriber for NullTranscriber {
    async fn transcribe(&self, _samples: &[f32], _sample_rate: u32) -> Result<String> {
        Ok(String::new())
    }
}

/// Classifier that replays scripted outputs and records what it was asked
#[derive(Default)]
struct ScriptedClassifier {
    outputs: Mutex<VecDeque<ClassifierOutput>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedClassifier {
    fn push(&self, output: ClassifierOutput) {
        self.outputs.lock().unwrap().push_back(output);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl IntentClassifier for ScriptedClassifier {
    async fn classify(
        &self,
        user_text: &str,
        _context: &BTreeMap<String, String>,
    ) -> Result<ClassifierOutput> {
        self.calls.lock().unwrap().push(user_text.to_string());
        Ok(self
            .outputs
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| chat("okay")))
    }
}

fn chat(text: &str) -> ClassifierOutput {
    ClassifierOutput {
        intent: "chat".to_string(),
        text: text.to_string(),
        ..ClassifierOutput::default()
    }
}

fn intent(name: &str, params: &[(&str, &str)]) -> ClassifierOutput {
    ClassifierOutput {
        intent: name.to_string(),
        parameters: params
            .iter()
            .map(|&(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        ..ClassifierOutput::default()
    }
}

fn test_config(dir: &tempfile::TempDir) -> Config {
    Config {
        memory_path: dir.path().join("memory.json"),
        ..Config::default()
    }
}

fn daemon_with(classifier: Arc<ScriptedClassifier>, config: Config) -> Daemon {
    Daemon::with_engines(
        config,
        Arc::new(NullTranscriber),
        classifier,
        Speaker::disconnected(),
        Arc::new(AtomicBool::new(false)),
    )
}

/// Handler that counts invocations and finishes the exchange
struct CountingHandler {
    count: Arc<AtomicUsize>,
}

impl skills::SkillHandler for CountingHandler {
    fn handle(&self, ctx: SkillContext) -> Result<bool> {
        self.count.fetch_add(1, Ordering::SeqCst);
        ctx.session.clear_pending_intent();
        ctx.session.clear_current_question();
        Ok(true)
    }
}

#[tokio::test]
async fn asleep_utterances_never_reach_the_classifier() {
    let dir = tempfile::tempdir().unwrap();
    let classifier = Arc::new(ScriptedClassifier::default());
    let mut daemon = daemon_with(Arc::clone(&classifier), test_config(&dir));

    daemon.handle_transcript("what's the weather like").await.unwrap();
    daemon.handle_transcript("open the browser please").await.unwrap();

    assert!(!daemon.wake().is_awake());
    assert!(classifier.calls().is_empty());
}

#[tokio::test]
async fn wake_phrase_wakes_and_explicit_sleep_clears_session() {
    let dir = tempfile::tempdir().unwrap();
    let classifier = Arc::new(ScriptedClassifier::default());
    let mut daemon = daemon_with(Arc::clone(&classifier), test_config(&dir));

    daemon.handle_transcript("Lumen wake up").await.unwrap();
    assert!(daemon.wake().is_awake());

    classifier.push(chat("hello!"));
    daemon.handle_transcript("hello there").await.unwrap();
    assert_eq!(classifier.calls(), vec!["hello there"]);
    assert!(!daemon.session().recent_history().is_empty());

    daemon.handle_transcript("Go to sleep.").await.unwrap();
    assert!(!daemon.wake().is_awake());
    assert!(daemon.session().recent_history().is_empty());
    assert!(daemon.session().pending_intent().is_none());
}

#[tokio::test]
async fn command_after_wake_phrase_is_processed_immediately() {
    let dir = tempfile::tempdir().unwrap();
    let classifier = Arc::new(ScriptedClassifier::default());
    let mut daemon = daemon_with(Arc::clone(&classifier), test_config(&dir));

    classifier.push(chat("it is sunny"));
    daemon
        .handle_transcript("Lumen wake up, how are you today")
        .await
        .unwrap();

    assert!(daemon.wake().is_awake());
    assert_eq!(classifier.calls(), vec!["how are you today"]);
}

#[tokio::test]
async fn inactivity_timeout_gates_the_next_command() {
    let dir = tempfile::tempdir().unwrap();
    let classifier = Arc::new(ScriptedClassifier::default());
    let mut config = test_config(&dir);
    config.sleep_timeout = Duration::from_millis(50);
    let mut daemon = daemon_with(Arc::clone(&classifier), config);

    daemon.handle_transcript("lumen wake up").await.unwrap();
    assert!(daemon.wake().is_awake());

    // The utterance that breaks a long silence must find the assistant
    // asleep, not be processed as an awake command
    tokio::time::sleep(Duration::from_millis(120)).await;
    daemon.handle_transcript("what time is it").await.unwrap();

    assert!(!daemon.wake().is_awake());
    assert!(classifier.calls().is_empty());
}

#[tokio::test]
async fn multibyte_transcript_around_the_wake_phrase_is_handled() {
    let dir = tempfile::tempdir().unwrap();
    let classifier = Arc::new(ScriptedClassifier::default());
    let mut daemon = daemon_with(Arc::clone(&classifier), test_config(&dir));

    // Lowercasing "İ" changes byte lengths; the remainder after the wake
    // phrase must still be sliced at a char boundary
    classifier.push(chat("hello"));
    daemon.handle_transcript("İ lumen wake upé").await.unwrap();

    assert!(daemon.wake().is_awake());
}

#[tokio::test]
async fn command_words_match_inside_longer_utterances() {
    let dir = tempfile::tempdir().unwrap();
    let classifier = Arc::new(ScriptedClassifier::default());
    let mut daemon = daemon_with(Arc::clone(&classifier), test_config(&dir));

    daemon.handle_transcript("lumen wake up").await.unwrap();

    classifier.push(intent("send_message", &[("receiver", "Alex")]));
    daemon.handle_transcript("send a message to Alex").await.unwrap();
    assert!(daemon.session().pending_intent().is_some());

    // "stop" embedded in a longer phrase still interrupts
    daemon.handle_transcript("Please stop!").await.unwrap();
    assert!(daemon.session().pending_intent().is_none());
    assert!(daemon.wake().is_awake());

    // "go to sleep" embedded in a longer phrase still sleeps
    daemon.handle_transcript("okay go to sleep now").await.unwrap();
    assert!(!daemon.wake().is_awake());
}

#[tokio::test]
async fn slot_filling_collects_params_in_order_and_fires_once() {
    let dir = tempfile::tempdir().unwrap();
    let classifier = Arc::new(ScriptedClassifier::default());
    let mut daemon = daemon_with(Arc::clone(&classifier), test_config(&dir));

    let count = Arc::new(AtomicUsize::new(0));
    let mut registry = SkillRegistry::new();
    registry.register(
        Skill::new(
            "send_message",
            "send message",
            Arc::new(CountingHandler {
                count: Arc::clone(&count),
            }),
        )
        .with_required_params(vec![
            RequiredParam::new("receiver", "Who should I send the message to?"),
            RequiredParam::new("message_text", "What should I say?"),
            RequiredParam::new("platform", "Which platform should I use?"),
        ]),
    );
    daemon.set_registry(registry);

    daemon.handle_transcript("lumen wake up").await.unwrap();

    // "send a message to Alex" yields the intent with only the receiver
    classifier.push(intent("send_message", &[("receiver", "Alex")]));
    daemon.handle_transcript("send a message to Alex").await.unwrap();

    assert_eq!(daemon.session().pending_intent().as_deref(), Some("send_message"));
    assert_eq!(daemon.session().current_question().as_deref(), Some("message_text"));
    assert_eq!(count.load(Ordering::SeqCst), 0);

    // The answer is absorbed; the original request is re-classified
    classifier.push(intent("send_message", &[("receiver", "Alex")]));
    daemon.handle_transcript("tell him I'm on my way").await.unwrap();

    assert_eq!(daemon.session().current_question().as_deref(), Some("platform"));
    assert_eq!(
        daemon.session().parameter("message_text").as_deref(),
        Some("tell him I'm on my way")
    );
    assert_eq!(count.load(Ordering::SeqCst), 0);

    // Last answer completes the set and the handler fires exactly once
    classifier.push(intent("send_message", &[("receiver", "Alex")]));
    daemon.handle_transcript("use WhatsApp").await.unwrap();

    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert!(daemon.session().pending_intent().is_none());
    assert!(daemon.session().current_question().is_none());

    // The re-classified text was always the original request
    let calls = classifier.calls();
    assert_eq!(
        calls,
        vec![
            "send a message to Alex",
            "send a message to Alex",
            "send a message to Alex",
        ]
    );
}

#[tokio::test]
async fn interrupt_clears_pending_collection() {
    let dir = tempfile::tempdir().unwrap();
    let classifier = Arc::new(ScriptedClassifier::default());
    let mut daemon = daemon_with(Arc::clone(&classifier), test_config(&dir));

    daemon.handle_transcript("lumen wake up").await.unwrap();

    classifier.push(intent("send_message", &[("receiver", "Alex")]));
    daemon.handle_transcript("send a message to Alex").await.unwrap();
    assert!(daemon.session().pending_intent().is_some());

    daemon.handle_transcript("Stop!").await.unwrap();

    assert!(daemon.session().pending_intent().is_none());
    assert!(daemon.session().current_question().is_none());
    assert!(daemon.session().parameters().is_empty());
}

#[tokio::test]
async fn panicking_handler_does_not_stop_the_next_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let classifier = Arc::new(ScriptedClassifier::default());
    let mut daemon = daemon_with(Arc::clone(&classifier), test_config(&dir));

    let mut registry = SkillRegistry::new();
    registry.register(Skill::new(
        "explode",
        "explode",
        Arc::new(|_ctx: SkillContext| -> Result<bool> { panic!("handler bug") }),
    ));
    daemon.set_registry(registry);

    daemon.handle_transcript("lumen wake up").await.unwrap();

    classifier.push(intent("explode", &[]));
    daemon.handle_transcript("do the thing").await.unwrap();

    // The loop is still alive and the next utterance is processed
    classifier.push(chat("still here"));
    daemon.handle_transcript("are you okay").await.unwrap();

    assert_eq!(classifier.calls().len(), 2);
}

#[tokio::test]
async fn unknown_intent_falls_back_to_chat_response() {
    let dir = tempfile::tempdir().unwrap();
    let classifier = Arc::new(ScriptedClassifier::default());
    let mut daemon = daemon_with(Arc::clone(&classifier), test_config(&dir));

    daemon.handle_transcript("lumen wake up").await.unwrap();

    classifier.push(ClassifierOutput {
        intent: "juggle".to_string(),
        text: "I can't juggle, but I appreciate the ambition.".to_string(),
        ..ClassifierOutput::default()
    });
    daemon.handle_transcript("juggle for me").await.unwrap();

    let history = daemon.session().recent_history();
    assert!(history.iter().any(|line| line.contains("appreciate the ambition")));
}

#[tokio::test]
async fn memory_updates_are_persisted_for_later_context() {
    let dir = tempfile::tempdir().unwrap();
    let classifier = Arc::new(ScriptedClassifier::default());
    let config = test_config(&dir);
    let memory_path = config.memory_path.clone();
    let mut daemon = daemon_with(Arc::clone(&classifier), config);

    daemon.handle_transcript("lumen wake up").await.unwrap();

    classifier.push(ClassifierOutput {
        intent: "chat".to_string(),
        text: "Nice to meet you, Alex.".to_string(),
        memory_update: Some(serde_json::json!({"identity": {"name": "Alex"}})),
        ..ClassifierOutput::default()
    });
    daemon.handle_transcript("my name is Alex").await.unwrap();

    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(memory_path).unwrap()).unwrap();
    assert_eq!(saved["identity"]["name"], "Alex");
}
