//! Clean model output before speaking it
//!
//! Strips JSON fragments, code blocks, role markers, markdown, and other
//! artifacts so only natural speech reaches the synthesizer.

use std::sync::LazyLock;

use regex::Regex;

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"```[\s\S]*?```").unwrap()
});
static INLINE_CODE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"`[^`]+`").unwrap()
});
static ROLE_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(?im)^(assistant|system|user|ai|lumen)\s*:\s*").unwrap()
});
static JSON_STRING_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r#""[\w_]+":\s*"[^"]*""#).unwrap()
});
static JSON_OBJECT_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r#""[\w_]+":\s*\{[^}]*\}"#).unwrap()
});
static JSON_SCALAR_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r#""[\w_]+":\s*(true|false|null|\d+)"#).unwrap()
});
static BRACES: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"[{}\[\]]").unwrap()
});
static BOLD: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"\*\*(.+?)\*\*").unwrap()
});
static BOLD_UNDERSCORE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"__(.+?)__").unwrap()
});
static ITALIC: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"\*(.+?)\*").unwrap()
});
static HEADER: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(?m)^#{1,6}\s*").unwrap()
});
static BULLET: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(?m)^\s*[-*•]\s+").unwrap()
});
static URL: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"https?://\S+").unwrap()
});
static REPEATED_QUOTES: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r#""{2,}"#).unwrap()
});
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"\s+").unwrap()
});

/// Clean raw model output into natural speech text
///
/// Returns an empty string if nothing speakable remains.
#[must_use]
pub fn sanitize_for_tts(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    // A whole-object JSON blob is reduced to its "text" field
    let mut text = text.to_string();
    let stripped = text.trim();
    if stripped.starts_with('{') && stripped.ends_with('}') {
        if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(stripped) {
            if let Some(inner) = parsed.get("text").and_then(serde_json::Value::as_str) {
                text = inner.to_string();
            }
        }
    }

    let text = CODE_FENCE.replace_all(&text, "");
    let text = INLINE_CODE.replace_all(&text, "");
    let text = ROLE_MARKER.replace_all(&text, "");
    let text = JSON_STRING_FIELD.replace_all(&text, "");
    let text = JSON_OBJECT_FIELD.replace_all(&text, "");
    let text = JSON_SCALAR_FIELD.replace_all(&text, "");
    let text = BRACES.replace_all(&text, "");
    let text = BOLD.replace_all(&text, "$1");
    let text = BOLD_UNDERSCORE.replace_all(&text, "$1");
    let text = ITALIC.replace_all(&text, "$1");
    let text = HEADER.replace_all(&text, "");
    let text = BULLET.replace_all(&text, "");
    let text = URL.replace_all(&text, "");
    let text = text.replace("\\\"", "\"");
    let text = REPEATED_QUOTES.replace_all(&text, "");
    let text = WHITESPACE.replace_all(&text, " ");

    text.trim()
        .trim_matches([',', ':', ';'])
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_blob_reduced_to_text_field() {
        let input = r#"{"intent": "chat", "text": "Hello there!"}"#;
        assert_eq!(sanitize_for_tts(input), "Hello there!");
    }

    #[test]
    fn code_fences_removed() {
        let input = "Here you go: ```python\nprint('hi')\n``` done.";
        assert_eq!(sanitize_for_tts(input), "Here you go: done.");
    }

    #[test]
    fn role_markers_removed() {
        assert_eq!(sanitize_for_tts("Assistant: Sure thing."), "Sure thing.");
        assert_eq!(sanitize_for_tts("LUMEN: At your service."), "At your service.");
    }

    #[test]
    fn markdown_formatting_stripped() {
        assert_eq!(sanitize_for_tts("That is **very** important"), "That is very important");
        assert_eq!(sanitize_for_tts("# Heading\ntext"), "Heading text");
        assert_eq!(sanitize_for_tts("- first\n- second"), "first second");
    }

    #[test]
    fn json_fragments_and_braces_stripped() {
        let input = r#"{"intent": "chat"} the answer is 4"#;
        assert_eq!(sanitize_for_tts(input), "the answer is 4");
    }

    #[test]
    fn urls_removed() {
        assert_eq!(
            sanitize_for_tts("See https://example.com/page for details"),
            "See for details"
        );
    }

    #[test]
    fn empty_input_stays_empty() {
        assert_eq!(sanitize_for_tts(""), "");
        assert_eq!(sanitize_for_tts("   "), "");
    }

    #[test]
    fn plain_speech_untouched() {
        assert_eq!(
            sanitize_for_tts("It is sunny in Berlin today."),
            "It is sunny in Berlin today."
        );
    }
}
