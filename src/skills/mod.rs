//! Skill registry and crash-isolated dispatch
//!
//! Skills map an intent name to a handler plus the parameters the handler
//! needs before it can run. Handlers are synchronous (they may block on
//! HTTP or process spawning) and run on a blocking worker behind a
//! supervisor task, so a panicking or failing handler is logged and never
//! takes the orchestration loop down.

pub mod date;
pub mod open_app;
pub mod search;
pub mod send_message;
pub mod weather;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::session::SessionMemory;
use crate::voice::tts::Speaker;
use crate::{Error, Result};

/// A parameter a skill needs, with the question to ask when it is missing
#[derive(Debug, Clone)]
pub struct RequiredParam {
    /// Parameter key in the collected parameter map
    pub name: String,
    /// Clarification question spoken when the parameter is missing
    pub prompt: String,
}

impl RequiredParam {
    /// Create a required parameter
    pub fn new(name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prompt: prompt.into(),
        }
    }
}

/// Everything a handler gets to work with
#[derive(Clone)]
pub struct SkillContext {
    /// Collected parameters for this invocation
    pub parameters: HashMap<String, String>,
    /// Spoken response the classifier produced alongside the intent
    pub response: String,
    /// Speech output handle
    pub speaker: Speaker,
    /// Dialogue session, for clearing the pending intent after dispatch
    pub session: SessionMemory,
}

impl SkillContext {
    /// Look up a parameter, treating blank values as absent
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.parameters
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }
}

/// A skill handler, callable from a blocking worker thread
pub trait SkillHandler: Send + Sync {
    /// Run the skill; `Ok(false)` means the skill declined gracefully
    ///
    /// # Errors
    ///
    /// Returns error on hard failure; the supervisor logs it.
    fn handle(&self, ctx: SkillContext) -> Result<bool>;
}

impl<F> SkillHandler for F
where
    F: Fn(SkillContext) -> Result<bool> + Send + Sync,
{
    fn handle(&self, ctx: SkillContext) -> Result<bool> {
        self(ctx)
    }
}

/// A registered skill
#[derive(Clone)]
pub struct Skill {
    /// Intent name this skill answers to
    pub intent: String,
    /// Human-readable name for logs
    pub name: String,
    /// Parameters required before dispatch, in clarification order
    pub required_params: Vec<RequiredParam>,
    handler: Arc<dyn SkillHandler>,
}

impl Skill {
    /// Create a skill with no required parameters
    pub fn new(
        intent: impl Into<String>,
        name: impl Into<String>,
        handler: Arc<dyn SkillHandler>,
    ) -> Self {
        Self {
            intent: intent.into(),
            name: name.into(),
            required_params: Vec::new(),
            handler,
        }
    }

    /// Declare the parameters this skill needs, in the order they should
    /// be asked for
    #[must_use]
    pub fn with_required_params(mut self, params: Vec<RequiredParam>) -> Self {
        self.required_params = params;
        self
    }

    /// First declared parameter missing or blank in `collected`, if any
    #[must_use]
    pub fn first_missing_param(
        &self,
        collected: &HashMap<String, String>,
    ) -> Option<&RequiredParam> {
        self.required_params.iter().find(|p| {
            collected
                .get(&p.name)
                .is_none_or(|v| v.trim().is_empty())
        })
    }
}

/// Intent-keyed skill table
#[derive(Default)]
pub struct SkillRegistry {
    skills: HashMap<String, Skill>,
}

impl SkillRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a skill; a later registration for the same intent replaces
    /// the earlier one
    pub fn register(&mut self, skill: Skill) {
        if self.skills.contains_key(&skill.intent) {
            tracing::warn!(intent = %skill.intent, "replacing existing skill registration");
        }
        tracing::debug!(intent = %skill.intent, name = %skill.name, "skill registered");
        self.skills.insert(skill.intent.clone(), skill);
    }

    /// Look up a skill by intent
    #[must_use]
    pub fn get(&self, intent: &str) -> Option<&Skill> {
        self.skills.get(intent)
    }

    /// Whether an intent has a registered skill
    #[must_use]
    pub fn has(&self, intent: &str) -> bool {
        self.skills.contains_key(intent)
    }

    /// Registered intent names
    #[must_use]
    pub fn intents(&self) -> Vec<&str> {
        self.skills.keys().map(String::as_str).collect()
    }

    /// Dispatch `intent` with `ctx` on a blocking worker
    ///
    /// Returns `None` for unknown intents. The returned handle is the
    /// supervisor task; panics and errors inside the handler are logged
    /// there and never propagate.
    pub fn dispatch(&self, intent: &str, ctx: SkillContext) -> Option<JoinHandle<()>> {
        let skill = self.skills.get(intent)?;
        let handler = Arc::clone(&skill.handler);
        let name = skill.name.clone();
        let intent = intent.to_string();

        Some(tokio::spawn(async move {
            let result =
                tokio::task::spawn_blocking(move || handler.handle(ctx)).await;
            match result {
                Ok(Ok(true)) => {
                    tracing::info!(intent = %intent, skill = %name, "skill completed");
                }
                Ok(Ok(false)) => {
                    tracing::warn!(intent = %intent, skill = %name, "skill declined");
                }
                Ok(Err(e)) => {
                    tracing::error!(intent = %intent, skill = %name, error = %e, "skill failed");
                }
                Err(e) if e.is_panic() => {
                    tracing::error!(intent = %intent, skill = %name, "skill panicked");
                }
                Err(e) => {
                    tracing::error!(intent = %intent, skill = %name, error = %e, "skill task failed");
                }
            }
        }))
    }
}

/// Convenience error constructor for handlers
#[must_use]
pub fn skill_error(message: impl Into<String>) -> Error {
    Error::Skill(message.into())
}
