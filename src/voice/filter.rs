//! Transcript hallucination filter
//!
//! Speech models produce stock phrases on silence or noise ("thank you",
//! "thanks for watching"). Transcripts matching the blacklist, too short to
//! be meaningful, or degenerate repetitions are dropped before any further
//! processing.

/// Stock phrases emitted by speech models on empty or noisy audio
const BLACKLIST: &[&str] = &[
    "thank you",
    "thanks for watching",
    "thanks for listening",
    "subscribe",
    "like and subscribe",
    "please subscribe",
    "see you next time",
    "bye",
    "goodbye",
    "you",
    "the end",
    "hmm",
    "huh",
    "...",
    "ah",
    "oh",
    "uh",
    "um",
    "so",
    "",
];

/// Check whether a transcript is a transcription artifact
///
/// The text is lowercased, trimmed, and stripped of trailing punctuation
/// before the checks: exact blacklist match, two or fewer characters, or
/// three-plus identical words.
#[must_use]
pub fn is_hallucination(text: &str) -> bool {
    let cleaned = text
        .to_lowercase()
        .trim()
        .trim_end_matches(['.', '!', '?', ',', ';', ':'])
        .to_string();

    if BLACKLIST.contains(&cleaned.as_str()) {
        return true;
    }

    if cleaned.chars().count() <= 2 {
        return true;
    }

    let words: Vec<&str> = cleaned.split_whitespace().collect();
    if words.len() >= 3 && words.iter().all(|w| *w == words[0]) {
        return true;
    }

    false
}
