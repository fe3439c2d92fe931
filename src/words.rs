//! Source word list.

use anyhow::{bail, Context, Result};
use std::path::Path;

/// Seed words used when no word list file is given.
pub const DEFAULT_WORDS: &[&str] = &[
    "hello",
    "goodbye",
    "please",
    "thank you",
    "excuse me",
    "help",
    "sorry",
    "water",
    "yes",
    "no",
];

pub fn default_words() -> Vec<String> {
    DEFAULT_WORDS.iter().map(|w| w.to_string()).collect()
}

/// Parse a word list: one word or phrase per line, `#` starts a comment line.
/// Duplicates keep their first position.
pub fn parse_words(content: &str) -> Vec<String> {
    let mut words: Vec<String> = Vec::new();
    for line in content.lines() {
        let word = line.trim();
        if word.is_empty() || word.starts_with('#') {
            continue;
        }
        if !words.iter().any(|w| w == word) {
            words.push(word.to_string());
        }
    }
    words
}

pub fn load_words(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read word list {}", path.display()))?;

    let words = parse_words(&content);
    if words.is_empty() {
        bail!("Word list {} contains no words", path.display());
    }
    Ok(words)
}
