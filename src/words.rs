//! Word-level coverage between a description and its extracted entries
//!
//! Used to build the follow-up question (which description words did the
//! model leave out?) and by `summary` to report recovery proportions.

use lazy_regex::regex;
use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::parser::CharValue;

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are", "as", "at", "be",
        "because", "been", "before", "being", "below", "between", "both", "but", "by", "can", "did", "do", "does",
        "doing", "down", "during", "each", "few", "for", "from", "further", "had", "has", "have", "having", "he",
        "her", "here", "hers", "him", "his", "how", "i", "if", "in", "into", "is", "it", "its", "itself", "just",
        "me", "more", "most", "my", "no", "nor", "not", "now", "of", "off", "on", "once", "only", "or", "other",
        "our", "out", "over", "own", "same", "she", "should", "so", "some", "such", "than", "that", "the", "their",
        "them", "then", "there", "these", "they", "this", "those", "through", "to", "too", "under", "until", "up",
        "very", "was", "we", "were", "what", "when", "where", "which", "while", "who", "whom", "why", "will",
        "with", "you", "your",
    ]
    .into_iter()
    .collect()
});

static IRREGULAR_PLURALS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    [
        ("leaves", "leaf"),
        ("halves", "half"),
        ("apices", "apex"),
        ("calyces", "calyx"),
        ("species", "species"),
        ("series", "series"),
    ]
    .into_iter()
    .collect()
});

/// Reduce a plural noun to its singular so "leaves" matches "leaf".
/// Only alphabetic words longer than three letters are touched.
pub fn singular(word: &str) -> String {
    if let Some(irregular) = IRREGULAR_PLURALS.get(word) {
        return irregular.to_string();
    }
    if word.chars().count() <= 3 || !word.chars().all(char::is_alphabetic) {
        return word.to_string();
    }

    if let Some(stem) = word.strip_suffix("ies") {
        return format!("{}y", stem);
    }
    if ["sses", "xes", "ches", "shes"].iter().any(|suffix| word.ends_with(suffix)) {
        return word[..word.len() - 2].to_string();
    }
    if ["ss", "us", "is"].iter().any(|suffix| word.ends_with(suffix)) {
        return word.to_string();
    }
    word.strip_suffix('s').unwrap_or(word).to_string()
}

/// Lowercased, singularised content words of `text`, numeric ranges kept
/// as one token
pub fn word_set(text: &str) -> BTreeSet<String> {
    let lowered = text.to_lowercase();
    let collapsed = regex!(r"(\d)\s*[-–]\s*(\d)").replace_all(&lowered, "$1-$2");

    regex!(r"[\p{L}\d]+(?:[-.×/][\p{L}\d]+)*")
        .find_iter(&collapsed)
        .map(|m| m.as_str())
        .filter(|w| !STOP_WORDS.contains(w))
        .map(singular)
        .collect()
}

/// Render entries the way they are compared against the description
pub fn render_entries(entries: &[CharValue]) -> String {
    entries
        .iter()
        .map(|e| format!("{}: {}", e.characteristic, e.value))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Description words missing from the extracted entries, sorted
pub fn omitted_words(description: &str, entries: &[CharValue]) -> Vec<String> {
    let original = word_set(description);
    let result = word_set(&render_entries(entries));
    original.difference(&result).cloned().collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Coverage {
    pub nwords_original: usize,
    pub nwords_result: usize,
    pub nwords_recovered: usize,
    pub nwords_omitted: usize,
    pub nwords_created: usize,
    pub prop_recovered: f64,
}

pub fn coverage(original: &str, result: &str) -> Coverage {
    let original = word_set(original);
    let result = word_set(result);
    let recovered = original.intersection(&result).count();

    Coverage {
        nwords_original: original.len(),
        nwords_result: result.len(),
        nwords_recovered: recovered,
        nwords_omitted: original.difference(&result).count(),
        nwords_created: result.difference(&original).count(),
        prop_recovered: if original.is_empty() {
            0.0
        } else {
            recovered as f64 / original.len() as f64
        },
    }
}
