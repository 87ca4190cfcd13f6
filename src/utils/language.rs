use once_cell::sync::Lazy;
use regex::Regex;
use whatlang::{detect, Lang, Script};

const MIN_ALPHA_CHARS: usize = 2;
const LATIN_CONFIDENCE_THRESHOLD: f64 = 0.68;
const NON_LATIN_CONFIDENCE_THRESHOLD: f64 = 0.5;

static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://\S+|www\.\S+").expect("valid url regex"));
static COMMAND_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(^|\s)/[a-z0-9_@]+").expect("valid command regex"));
static WHITESPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

fn normalize_text_for_detection(text: &str) -> String {
    let without_urls = URL_RE.replace_all(text, " ");
    let without_commands = COMMAND_RE.replace_all(&without_urls, " ");
    WHITESPACE_RE
        .replace_all(&without_commands, " ")
        .trim()
        .to_string()
}

fn alphabetic_char_count(text: &str) -> usize {
    text.chars().filter(|ch| ch.is_alphabetic()).count()
}

pub fn detect_language(text: &str) -> Option<Lang> {
    let normalized = normalize_text_for_detection(text);
    if normalized.is_empty() || alphabetic_char_count(&normalized) < MIN_ALPHA_CHARS {
        return None;
    }

    let info = detect(&normalized)?;
    if info.is_reliable() {
        return Some(info.lang());
    }

    let threshold = match info.script() {
        Script::Latin => LATIN_CONFIDENCE_THRESHOLD,
        _ => NON_LATIN_CONFIDENCE_THRESHOLD,
    };
    if info.confidence() >= threshold {
        return Some(info.lang());
    }

    None
}

/// True only when the text is confidently English. Empty or ambiguous
/// conversations count as not English.
pub fn is_english(text: &str) -> bool {
    detect_language(text) == Some(Lang::Eng)
}
