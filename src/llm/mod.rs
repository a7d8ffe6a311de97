//! Intent classification via a chat-completions model
//!
//! The classifier turns a transcript plus compact context into an intent,
//! its parameters, and a spoken response. [`HttpClassifier`] talks to an
//! OpenAI-compatible chat endpoint (LM Studio by default); the trait lets
//! tests drive the loop with canned outputs. When the endpoint is
//! unreachable the classifier degrades to an offline chat response instead
//! of erroring, so the loop keeps running.

pub mod parse;

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::Result;

pub use parse::safe_json_parse;

/// Request timeout for classification calls
const REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

/// Classified user intent with collected parameters
#[derive(Debug, Clone, Default)]
pub struct ClassifierOutput {
    /// Intent name, `chat` for free conversation
    pub intent: String,
    /// Parameters extracted from the utterance
    pub parameters: HashMap<String, String>,
    /// Spoken response text (chat mode or alongside an intent)
    pub text: String,
    /// Model's own signal that information is missing
    pub needs_clarification: bool,
    /// Partial long-term memory update the model extracted, if any
    pub memory_update: Option<Value>,
    /// Whether this output came from the offline fallback
    pub offline: bool,
}

/// Classifies transcripts into intents
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    /// Classify `user_text` given compact context lines
    ///
    /// # Errors
    ///
    /// Returns error if classification fails in a non-recoverable way.
    /// Implementations should prefer degrading to an offline output.
    async fn classify(
        &self,
        user_text: &str,
        context: &BTreeMap<String, String>,
    ) -> Result<ClassifierOutput>;
}

/// HTTP classifier against an OpenAI-compatible chat endpoint
pub struct HttpClassifier {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    model: String,
    system_prompt: String,
}

impl HttpClassifier {
    /// Create a classifier for `url` (the full chat-completions endpoint)
    ///
    /// The system prompt may contain `{current_datetime}` and
    /// `{user_profile}` placeholders, substituted per request.
    #[must_use]
    pub fn new(
        url: String,
        api_key: Option<String>,
        model: String,
        system_prompt: String,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            url,
            api_key,
            model,
            system_prompt,
        }
    }

    fn render_system_prompt(&self, context: &BTreeMap<String, String>) -> String {
        let now = chrono::Local::now().format("%A, %Y-%m-%d %H:%M").to_string();
        let profile = context
            .iter()
            .map(|(k, v)| format!("{k}: {v}"))
            .collect::<Vec<_>>()
            .join("\n");
        self.system_prompt
            .replace("{current_datetime}", &now)
            .replace("{user_profile}", &profile)
    }
}

#[async_trait]
impl IntentClassifier for HttpClassifier {
    async fn classify(
        &self,
        user_text: &str,
        context: &BTreeMap<String, String>,
    ) -> Result<ClassifierOutput> {
        #[derive(serde::Serialize)]
        struct Message<'a> {
            role: &'a str,
            content: &'a str,
        }

        #[derive(serde::Serialize)]
        struct ChatRequest<'a> {
            model: &'a str,
            messages: Vec<Message<'a>>,
            temperature: f32,
            max_tokens: u32,
        }

        #[derive(serde::Deserialize)]
        struct ChatResponse {
            choices: Vec<Choice>,
        }

        #[derive(serde::Deserialize)]
        struct Choice {
            message: ChoiceMessage,
        }

        #[derive(serde::Deserialize)]
        struct ChoiceMessage {
            content: String,
        }

        let system = self.render_system_prompt(context);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                Message {
                    role: "system",
                    content: &system,
                },
                Message {
                    role: "user",
                    content: user_text,
                },
            ],
            temperature: 0.2,
            max_tokens: 500,
        };

        let mut req = self.client.post(&self.url).json(&request);
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {key}"));
        }

        let response = match req.send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "classifier unreachable, degrading to offline mode");
                return Ok(offline_output());
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, body = %body, "classifier API error");
            return Ok(offline_output());
        }

        let chat: ChatResponse = match response.json().await {
            Ok(chat) => chat,
            Err(e) => {
                tracing::warn!(error = %e, "classifier response unreadable");
                return Ok(offline_output());
            }
        };

        let content = chat
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .unwrap_or_default();

        Ok(output_from_value(&safe_json_parse(content)))
    }
}

/// Build a `ClassifierOutput` from a recovered JSON object
#[must_use]
pub fn output_from_value(value: &Value) -> ClassifierOutput {
    let intent = value["intent"]
        .as_str()
        .filter(|s| !s.is_empty())
        .unwrap_or("chat")
        .to_string();

    let mut parameters = HashMap::new();
    if let Some(map) = value["parameters"].as_object() {
        for (key, val) in map {
            parameters.insert(key.clone(), value_to_string(val));
        }
    }

    let text = value["response"]
        .as_str()
        .or_else(|| value["text"].as_str())
        .unwrap_or_default()
        .to_string();

    ClassifierOutput {
        intent,
        parameters,
        text,
        needs_clarification: value["needs_clarification"].as_bool().unwrap_or(false),
        memory_update: value
            .get("memory_update")
            .filter(|v| v.is_object())
            .cloned(),
        offline: false,
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn offline_output() -> ClassifierOutput {
    ClassifierOutput {
        intent: "chat".to_string(),
        text: "I can't reach the language model right now. Please check that it is running."
            .to_string(),
        offline: true,
        ..ClassifierOutput::default()
    }
}
