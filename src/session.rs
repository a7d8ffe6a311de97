//! Short-lived dialogue memory
//!
//! Holds the state of the current exchange: the intent awaiting missing
//! parameters, the parameters collected so far, the clarification question
//! in flight, the last user/assistant texts, and a bounded history of
//! recent turns. The handle is cloneable and internally locked so the
//! orchestration loop and a skill handler on a worker thread can both
//! touch it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Turns of history kept for the classifier prompt
const HISTORY_LIMIT: usize = 5;

#[derive(Debug, Default)]
struct SessionState {
    pending_intent: Option<String>,
    parameters: HashMap<String, String>,
    current_question: Option<String>,
    last_user_text: Option<String>,
    last_ai_response: Option<String>,
    last_search: Option<(String, String)>,
    history: Vec<String>,
}

/// Cloneable handle to the dialogue session state
#[derive(Debug, Clone, Default)]
pub struct SessionMemory {
    inner: Arc<Mutex<SessionState>>,
}

impl SessionMemory {
    /// Create an empty session
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut SessionState) -> T) -> T {
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    /// Set the intent awaiting parameter collection
    pub fn set_pending_intent(&self, intent: impl Into<String>) {
        self.with_state(|s| s.pending_intent = Some(intent.into()));
    }

    /// The intent awaiting parameter collection, if any
    #[must_use]
    pub fn pending_intent(&self) -> Option<String> {
        self.with_state(|s| s.pending_intent.clone())
    }

    /// Clear the pending intent (called by handlers after dispatch)
    pub fn clear_pending_intent(&self) {
        self.with_state(|s| s.pending_intent = None);
    }

    /// Merge parameters into the collected set; empty values don't
    /// overwrite existing non-empty ones
    pub fn merge_parameters(&self, params: &HashMap<String, String>) {
        self.with_state(|s| {
            for (key, value) in params {
                if value.trim().is_empty() && s.parameters.contains_key(key) {
                    continue;
                }
                s.parameters.insert(key.clone(), value.clone());
            }
        });
    }

    /// Set one parameter
    pub fn set_parameter(&self, key: impl Into<String>, value: impl Into<String>) {
        self.with_state(|s| {
            s.parameters.insert(key.into(), value.into());
        });
    }

    /// Look up one collected parameter
    #[must_use]
    pub fn parameter(&self, key: &str) -> Option<String> {
        self.with_state(|s| s.parameters.get(key).cloned())
    }

    /// Snapshot of all collected parameters
    #[must_use]
    pub fn parameters(&self) -> HashMap<String, String> {
        self.with_state(|s| s.parameters.clone())
    }

    /// Record the parameter a clarification question is asking about
    pub fn set_current_question(&self, param: impl Into<String>) {
        self.with_state(|s| s.current_question = Some(param.into()));
    }

    /// The parameter the outstanding clarification question targets
    #[must_use]
    pub fn current_question(&self) -> Option<String> {
        self.with_state(|s| s.current_question.clone())
    }

    /// Clear the outstanding clarification question
    pub fn clear_current_question(&self) {
        self.with_state(|s| s.current_question = None);
    }

    /// Record the most recent user utterance
    pub fn set_last_user_text(&self, text: impl Into<String>) {
        self.with_state(|s| s.last_user_text = Some(text.into()));
    }

    /// The most recent user utterance that started the exchange
    #[must_use]
    pub fn last_user_text(&self) -> Option<String> {
        self.with_state(|s| s.last_user_text.clone())
    }

    /// Record the most recent assistant response
    pub fn set_last_ai_response(&self, text: impl Into<String>) {
        self.with_state(|s| s.last_ai_response = Some(text.into()));
    }

    /// Record the most recent web search and its spoken answer
    pub fn set_last_search(&self, query: impl Into<String>, answer: impl Into<String>) {
        self.with_state(|s| s.last_search = Some((query.into(), answer.into())));
    }

    /// The most recent web search as a (query, answer) pair
    #[must_use]
    pub fn last_search(&self) -> Option<(String, String)> {
        self.with_state(|s| s.last_search.clone())
    }

    /// Append a turn to the bounded history
    pub fn push_history(&self, line: impl Into<String>) {
        self.with_state(|s| {
            s.history.push(line.into());
            if s.history.len() > HISTORY_LIMIT {
                let excess = s.history.len() - HISTORY_LIMIT;
                s.history.drain(..excess);
            }
        });
    }

    /// The most recent history lines, oldest first
    #[must_use]
    pub fn recent_history(&self) -> Vec<String> {
        self.with_state(|s| s.history.clone())
    }

    /// Drop pending intent, parameters, and the outstanding question
    ///
    /// Used by interrupt commands and explicit sleep. History and last
    /// texts are cleared too; the exchange is over.
    pub fn clear(&self) {
        self.with_state(|s| *s = SessionState::default());
    }
}
