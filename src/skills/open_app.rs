//! Application launcher skill
//!
//! Launches an application by its spoken name through a configurable
//! name-to-command table. Names are normalized (lowercased, apostrophes
//! dropped) before lookup; unknown names fall back to invoking the name
//! itself as a command.

use std::collections::HashMap;
use std::process::Command;
use std::sync::Arc;

use crate::Result;
use crate::skills::{RequiredParam, Skill, SkillContext, SkillHandler};

/// Build the open-app skill with a name-to-command table
#[must_use]
pub fn skill(commands: HashMap<String, String>) -> Skill {
    Skill::new("open_app", "open app", Arc::new(OpenApp { commands }))
        .with_required_params(vec![RequiredParam::new(
            "app_name",
            "Which application should I open?",
        )])
}

struct OpenApp {
    commands: HashMap<String, String>,
}

impl SkillHandler for OpenApp {
    fn handle(&self, ctx: SkillContext) -> Result<bool> {
        let Some(app_name) = ctx.param("app_name").map(String::from) else {
            ctx.speaker
                .say("I couldn't determine which application to open.");
            return Ok(false);
        };

        if !ctx.response.is_empty() {
            ctx.speaker.say(ctx.response.clone());
        }

        let normalized = normalize(&app_name);
        let command = self
            .commands
            .get(&normalized)
            .cloned()
            .unwrap_or_else(|| normalized.clone());

        match launch(&command) {
            Ok(()) => {
                tracing::info!(app = %app_name, command = %command, "application launched");
                ctx.session.clear_pending_intent();
                Ok(true)
            }
            Err(e) => {
                tracing::warn!(app = %app_name, command = %command, error = %e, "launch failed");
                ctx.speaker.say(format!("I failed to open {app_name}."));
                Ok(false)
            }
        }
    }
}

fn normalize(name: &str) -> String {
    name.to_lowercase()
        .trim()
        .replace(['\'', '\u{2019}'], "")
}

fn launch(command: &str) -> std::io::Result<()> {
    let mut parts = command.split_whitespace();
    let Some(program) = parts.next() else {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "empty launch command",
        ));
    };
    Command::new(program).args(parts).spawn().map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_drops_apostrophes_and_case() {
        assert_eq!(normalize("  VS Code "), "vs code");
        assert_eq!(normalize("O'Brien's Tool"), "obriens tool");
    }

    #[test]
    fn empty_command_is_rejected() {
        assert!(launch("").is_err());
    }

    #[test]
    fn skill_requires_app_name() {
        let skill = skill(HashMap::new());
        assert_eq!(skill.required_params[0].name, "app_name");
    }
}
