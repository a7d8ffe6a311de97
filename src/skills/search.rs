//! Web search skill
//!
//! Queries the DuckDuckGo instant-answer API and condenses the returned
//! snippets into one coherent spoken sentence: boilerplate phrases are
//! dropped, dangling fragments are joined with the following sentence,
//! and at most a few sentences are combined. The query and answer are
//! recorded on the session so follow-up questions have something to
//! refer to.

use std::sync::{Arc, LazyLock, Mutex};
use std::time::{Duration, Instant};

use regex::Regex;

use crate::Result;
use crate::skills::{Skill, SkillContext, SkillHandler};

const SEARCH_URL: &str = "https://api.duckduckgo.com/";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Minimum gap between searches
const SEARCH_DELAY: Duration = Duration::from_secs(2);

/// Sentences combined into the spoken answer, at most
const MAX_SNIPPETS: usize = 3;

/// Sentences shorter than this are dropped as incomplete
const MIN_SENTENCE_LENGTH: usize = 30;

/// Boilerplate markers that disqualify a snippet or sentence
const NOISE_KEYWORDS: &[&str] = &[
    "read more",
    "learn more",
    "click here",
    "infographic",
    "google trends",
    "year in search",
    "most searched",
    "top 100",
    "subscribe",
    "share this",
    "advertisement",
    "ad:",
];

/// Build the web search skill
#[must_use]
pub fn skill() -> Skill {
    Skill::new("search", "web search", Arc::new(WebSearch))
}

struct WebSearch;

impl SkillHandler for WebSearch {
    fn handle(&self, ctx: SkillContext) -> Result<bool> {
        let Some(query) = ctx.param("query").map(str::trim).map(String::from) else {
            ctx.speaker.say("I couldn't understand the search request.");
            return Ok(false);
        };

        throttle();

        let Some(snippets) = fetch_snippets(&query) else {
            ctx.speaker.say("The web search failed.");
            return Ok(false);
        };
        if snippets.is_empty() {
            ctx.speaker.say("I couldn't find relevant information.");
            return Ok(false);
        }

        let answer = select_best_sentence(&snippets).unwrap_or_else(|| {
            "I found information online, but couldn't summarize it clearly.".to_string()
        });

        tracing::info!(query = %query, "search answered");
        ctx.speaker.say(answer.clone());
        ctx.session.set_last_search(query, answer);
        ctx.session.clear_pending_intent();
        Ok(true)
    }
}

static LAST_SEARCH: LazyLock<Mutex<Option<Instant>>> = LazyLock::new(|| Mutex::new(None));

/// Enforce the inter-search delay; runs on a blocking worker so sleeping
/// is fine
fn throttle() {
    let mut last = match LAST_SEARCH.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if let Some(previous) = *last {
        let elapsed = previous.elapsed();
        if elapsed < SEARCH_DELAY {
            std::thread::sleep(SEARCH_DELAY - elapsed);
        }
    }
    *last = Some(Instant::now());
}

#[derive(serde::Deserialize)]
struct InstantAnswer {
    #[serde(rename = "AbstractText", default)]
    abstract_text: String,
    #[serde(rename = "RelatedTopics", default)]
    related_topics: Vec<RelatedTopic>,
}

#[derive(serde::Deserialize)]
struct RelatedTopic {
    #[serde(rename = "Text", default)]
    text: String,
}

fn fetch_snippets(query: &str) -> Option<Vec<String>> {
    let client = reqwest::blocking::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .ok()?;

    let response: InstantAnswer = client
        .get(SEARCH_URL)
        .query(&[
            ("q", query),
            ("format", "json"),
            ("no_html", "1"),
            ("skip_disambig", "1"),
        ])
        .send()
        .ok()?
        .json()
        .ok()?;

    let mut snippets = Vec::new();
    if !response.abstract_text.is_empty() {
        snippets.push(response.abstract_text);
    }
    snippets.extend(
        response
            .related_topics
            .into_iter()
            .map(|t| t.text)
            .filter(|t| !t.is_empty())
            .take(MAX_SNIPPETS),
    );
    Some(snippets)
}

static ELLIPSIS: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"\.{3,}").unwrap()
});
static BRACKETED: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"\[[^\]]*\]").unwrap()
});
static PARENTHESIZED: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"\([^)]*\)").unwrap()
});
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"\s+").unwrap()
});

/// Strip ellipses, bracketed asides, and extra whitespace from a snippet
fn clean(text: &str) -> String {
    let text = ELLIPSIS.replace_all(text, ".");
    let text = BRACKETED.replace_all(&text, "");
    let text = PARENTHESIZED.replace_all(&text, "");
    let text = WHITESPACE.replace_all(&text, " ");
    text.trim().to_string()
}

fn is_noise(text: &str) -> bool {
    let t = text.to_lowercase();
    NOISE_KEYWORDS.iter().any(|kw| t.contains(kw))
}

/// Split on sentence-final punctuation followed by whitespace
fn split_into_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') && chars.peek().is_some_and(|n| n.is_whitespace()) {
            sentences.push(current.trim().to_string());
            current.clear();
        }
    }
    if !current.trim().is_empty() {
        sentences.push(current.trim().to_string());
    }
    sentences
}

/// Split a snippet into sentences, joining fragments that end on a
/// dangling preposition and dropping ones too short to stand alone
fn usable_sentences(text: &str) -> Vec<String> {
    const DANGLING: &[&str] = &[
        "of", "in", "at", "on", "by", "after", "before", "with", "for", "to",
    ];

    let mut out = Vec::new();
    let mut buffer = String::new();

    for raw in split_into_sentences(text) {
        let sentence = clean(&raw);
        if sentence.is_empty() {
            continue;
        }

        let last_word = sentence
            .split_whitespace()
            .last()
            .unwrap_or_default()
            .trim_end_matches(['.', '!', '?', ','])
            .to_lowercase();
        if DANGLING.contains(&last_word.as_str()) {
            buffer.push_str(&sentence);
            buffer.push(' ');
            continue;
        }

        let sentence = if buffer.is_empty() {
            sentence
        } else {
            let joined = format!("{buffer}{sentence}");
            buffer.clear();
            joined
        };

        if sentence.len() >= MIN_SENTENCE_LENGTH {
            out.push(sentence);
        }
    }

    out
}

/// Combine up to [`MAX_SNIPPETS`] usable sentences into one answer
fn select_best_sentence(snippets: &[String]) -> Option<String> {
    let mut answer = String::new();
    let mut count = 0;

    for snippet in snippets {
        if snippet.is_empty() || is_noise(snippet) {
            continue;
        }

        for sentence in usable_sentences(snippet) {
            if is_noise(&sentence) {
                continue;
            }

            if !answer.is_empty() {
                answer.push(' ');
            }
            answer.push_str(&sentence);
            count += 1;

            if count >= MAX_SNIPPETS {
                return Some(answer);
            }
        }
    }

    if answer.is_empty() { None } else { Some(answer) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::session::SessionMemory;
    use crate::voice::tts::Speaker;

    #[test]
    fn snippet_cleanup() {
        assert_eq!(
            clean("Rust is...  a [1] great (really) language"),
            "Rust is. a great language"
        );
    }

    #[test]
    fn noise_detection() {
        assert!(is_noise("Click here to subscribe"));
        assert!(is_noise("Advertisement. Best deals today"));
        assert!(!is_noise("Paris is the capital of France"));
    }

    #[test]
    fn best_sentence_skips_noise_and_short_fragments() {
        let snippets = vec![
            "Advertisement. Click here for the best hosting deals.".to_string(),
            "Paris is the capital and most populous city of France.".to_string(),
            "Short.".to_string(),
        ];
        assert_eq!(
            select_best_sentence(&snippets).as_deref(),
            Some("Paris is the capital and most populous city of France.")
        );
    }

    #[test]
    fn dangling_fragment_joins_the_next_sentence() {
        let sentences = usable_sentences(
            "He served as the director of. The national library for ten years straight.",
        );
        assert_eq!(
            sentences,
            ["He served as the director of. The national library for ten years straight."]
        );
    }

    #[test]
    fn all_noise_yields_none() {
        let snippets = vec!["Subscribe and share this with your friends today!".to_string()];
        assert_eq!(select_best_sentence(&snippets), None);
    }

    #[test]
    fn skill_dispatches_on_search_with_no_required_params() {
        let skill = skill();
        assert_eq!(skill.intent, "search");
        assert!(skill.required_params.is_empty());
    }

    #[test]
    fn missing_query_declines() {
        let ctx = SkillContext {
            parameters: HashMap::new(),
            response: String::new(),
            speaker: Speaker::disconnected(),
            session: SessionMemory::new(),
        };
        assert!(!WebSearch.handle(ctx).unwrap());
    }
}
