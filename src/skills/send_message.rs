//! Message sending skill
//!
//! Declares the three parameters the orchestration loop collects through
//! clarification questions before dispatch: who, what, and on which
//! platform, asked in that order. The actual delivery is delegated to the
//! desktop environment and is out of scope here; the handler confirms the
//! send and resets the exchange.

use std::sync::Arc;

use crate::Result;
use crate::skills::{RequiredParam, Skill, SkillContext, SkillHandler};

/// Build the send-message skill
#[must_use]
pub fn skill() -> Skill {
    Skill::new("send_message", "send message", Arc::new(SendMessage))
        .with_required_params(vec![
            RequiredParam::new("receiver", "Who should I send the message to?"),
            RequiredParam::new("message_text", "What should I say?"),
            RequiredParam::new(
                "platform",
                "Which platform should I use? WhatsApp, Telegram, or Discord?",
            ),
        ])
}

struct SendMessage;

impl SkillHandler for SendMessage {
    fn handle(&self, ctx: SkillContext) -> Result<bool> {
        let receiver = ctx.param("receiver").unwrap_or_default().trim().to_string();
        let message_text = ctx
            .param("message_text")
            .unwrap_or_default()
            .trim()
            .to_string();
        let platform = ctx
            .param("platform")
            .map_or("WhatsApp", str::trim)
            .to_string();

        if receiver.is_empty() || message_text.is_empty() {
            ctx.speaker
                .say("I'm missing details for the message, let's start over.");
            ctx.session.clear_pending_intent();
            ctx.session.clear_current_question();
            return Ok(false);
        }

        if !ctx.response.is_empty() {
            ctx.speaker.say(ctx.response.clone());
        }

        tracing::info!(
            receiver = %receiver,
            platform = %platform,
            chars = message_text.len(),
            "message handed off for delivery"
        );

        // The exchange is complete; a repeat of the intent starts fresh
        ctx.session.clear_current_question();
        ctx.session.clear_pending_intent();

        ctx.speaker
            .say(format!("Message sent to {receiver} via {platform}."));
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::session::SessionMemory;
    use crate::voice::tts::Speaker;

    #[test]
    fn params_declared_in_clarification_order() {
        let skill = skill();
        let names: Vec<&str> = skill
            .required_params
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(names, ["receiver", "message_text", "platform"]);
    }

    #[test]
    fn complete_dispatch_clears_pending_intent() {
        let session = SessionMemory::new();
        session.set_pending_intent("send_message");

        let mut parameters = HashMap::new();
        parameters.insert("receiver".to_string(), "Alex".to_string());
        parameters.insert("message_text".to_string(), "on my way".to_string());
        parameters.insert("platform".to_string(), "Discord".to_string());

        let ctx = SkillContext {
            parameters,
            response: String::new(),
            speaker: Speaker::disconnected(),
            session: session.clone(),
        };

        assert!(SendMessage.handle(ctx).unwrap());
        assert!(session.pending_intent().is_none());
        assert!(session.current_question().is_none());
    }

    #[test]
    fn missing_receiver_declines() {
        let ctx = SkillContext {
            parameters: HashMap::new(),
            response: String::new(),
            speaker: Speaker::disconnected(),
            session: SessionMemory::new(),
        };
        assert!(!SendMessage.handle(ctx).unwrap());
    }
}
