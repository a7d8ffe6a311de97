//! Recovery parser for model output
//!
//! Local models wrap JSON in markdown fences, truncate it, or prepend
//! prose. The parser tries progressively harder to recover a JSON object
//! and falls back to treating the whole text as a chat response, so a
//! malformed reply never kills the loop.

use serde_json::{Value, json};

/// Parse model output into a JSON object, recovering from common damage
///
/// Attempts in order: strip markdown fences and parse; repair missing
/// closing braces and parse; extract the outermost balanced-brace object
/// and parse that (with the same repair). If nothing yields an object, the
/// raw text becomes a chat response.
#[must_use]
pub fn safe_json_parse(raw: &str) -> Value {
    let text = strip_fences(raw.trim());

    if let Some(obj) = try_object(&text) {
        return obj;
    }

    if let Some(repaired) = repair_braces(&text) {
        if let Some(obj) = try_object(&repaired) {
            return obj;
        }
    }

    if let Some(extracted) = extract_braced(&text) {
        if let Some(obj) = try_object(&extracted) {
            return obj;
        }
        if let Some(repaired) = repair_braces(&extracted) {
            if let Some(obj) = try_object(&repaired) {
                return obj;
            }
        }
    }

    tracing::debug!("model output is not JSON, treating as chat text");
    json!({
        "intent": "chat",
        "parameters": {},
        "response": raw.trim(),
    })
}

fn try_object(text: &str) -> Option<Value> {
    serde_json::from_str::<Value>(text)
        .ok()
        .filter(Value::is_object)
}

/// Remove a surrounding markdown code fence, tolerating a language tag
fn strip_fences(text: &str) -> String {
    let mut text = text;
    if let Some(rest) = text.strip_prefix("```") {
        text = rest.split_once('\n').map_or(rest, |(_, body)| body);
    }
    let text = text.trim_end();
    text.strip_suffix("```").unwrap_or(text).trim().to_string()
}

/// Append closing braces when the text has more opens than closes
fn repair_braces(text: &str) -> Option<String> {
    let opens = text.matches('{').count();
    let closes = text.matches('}').count();
    if opens > closes {
        let mut repaired = text.to_string();
        repaired.push_str(&"}".repeat(opens - closes));
        Some(repaired)
    } else {
        None
    }
}

/// Extract the outermost balanced `{...}` span by depth counting
///
/// String literals are respected so braces inside values don't unbalance
/// the scan.
fn extract_braced(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[start..=start + i].to_string());
                }
            }
            _ => {}
        }
    }

    // Unterminated object: return from the first brace so the caller can
    // attempt brace repair
    Some(text[start..].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_clean_json() {
        let out = safe_json_parse(r#"{"intent": "weather_report", "parameters": {"city": "Berlin"}}"#);
        assert_eq!(out["intent"], "weather_report");
        assert_eq!(out["parameters"]["city"], "Berlin");
    }

    #[test]
    fn strips_markdown_fences() {
        let out = safe_json_parse("```json\n{\"intent\": \"chat\", \"response\": \"hi\"}\n```");
        assert_eq!(out["intent"], "chat");
        assert_eq!(out["response"], "hi");
    }

    #[test]
    fn repairs_truncated_object() {
        let out = safe_json_parse(r#"{"intent": "open_app", "parameters": {"app": "firefox""#);
        // Truncation mid-string still falls back rather than panicking
        assert!(out.is_object());
    }

    #[test]
    fn repairs_missing_close_brace() {
        let out = safe_json_parse(r#"{"intent": "open_app", "parameters": {"app": "firefox"}"#);
        assert_eq!(out["intent"], "open_app");
        assert_eq!(out["parameters"]["app"], "firefox");
    }

    #[test]
    fn extracts_object_from_prose() {
        let out = safe_json_parse(
            "Sure, here is the classification: {\"intent\": \"date_query\", \"parameters\": {}} Hope that helps!",
        );
        assert_eq!(out["intent"], "date_query");
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_extraction() {
        let out = safe_json_parse(r#"note {"intent": "chat", "response": "use {braces} freely"}"#);
        assert_eq!(out["response"], "use {braces} freely");
    }

    #[test]
    fn garbage_becomes_chat_response() {
        let out = safe_json_parse("I could not decide on an intent, sorry.");
        assert_eq!(out["intent"], "chat");
        assert_eq!(out["response"], "I could not decide on an intent, sorry.");
    }

    #[test]
    fn non_object_json_becomes_chat_response() {
        let out = safe_json_parse(r#"["a", "b"]"#);
        assert_eq!(out["intent"], "chat");
    }
}
