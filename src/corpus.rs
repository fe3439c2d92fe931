//! Corpus model and on-disk store.
//!
//! The corpus is a JSON array of entries. Every entry holds the source word
//! under `original` and one object per language code:
//!
//! ```json
//! [
//!   {
//!     "original": "hello",
//!     "es": { "word": "hola", "IPA": "ˈola", "text": "hola", "audio": "hello_es_hola.mp3" }
//!   }
//! ]
//! ```

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::languages::Language;

/// Per-language data for one entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LanguageResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word: Option<String>,

    #[serde(rename = "IPA", default, skip_serializing_if = "Option::is_none")]
    pub ipa: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub respelling: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_pronunciation: Option<String>,

    /// Audio filename, relative to the audio directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,

    /// Fields written by other tools; kept as-is on rewrite
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl LanguageResult {
    /// A fresh result for a translated word. `word` and `text` carry the same
    /// value; the app reads either.
    pub fn translated(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            word: Some(text.clone()),
            text: Some(text),
            ..Self::default()
        }
    }

    /// The spoken form: `word`, falling back to `text`.
    pub fn spoken(&self) -> Option<&str> {
        self.word
            .as_deref()
            .or(self.text.as_deref())
            .filter(|w| !w.trim().is_empty())
    }
}

/// One source word and its per-language data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    #[serde(default)]
    original: String,

    #[serde(flatten)]
    languages: BTreeMap<String, LanguageResult>,
}

impl Entry {
    pub fn new(original: impl Into<String>) -> Self {
        Self {
            original: original.into(),
            languages: BTreeMap::new(),
        }
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    /// The stored key for `code`. Hand-edited corpora may write `"ES"` or
    /// `"zh-CN"`, so an exact match wins and case is ignored otherwise.
    fn key_of(&self, code: &str) -> Option<&String> {
        self.languages
            .get_key_value(code)
            .map(|(key, _)| key)
            .or_else(|| self.languages.keys().find(|k| k.eq_ignore_ascii_case(code)))
    }

    pub fn has_language(&self, language: Language) -> bool {
        self.key_of(language.code()).is_some()
    }

    pub fn language(&self, code: &str) -> Option<&LanguageResult> {
        let key = self.key_of(code)?;
        self.languages.get(key)
    }

    pub fn language_mut(&mut self, code: &str) -> Option<&mut LanguageResult> {
        let key = self.key_of(code)?.clone();
        self.languages.get_mut(&key)
    }

    /// Add or replace the data for one language. An existing key keeps its
    /// spelling.
    pub fn set_language(&mut self, language: Language, result: LanguageResult) {
        let key = self
            .key_of(language.code())
            .cloned()
            .unwrap_or_else(|| language.code().to_string());
        self.languages.insert(key, result);
    }

    /// Language codes present on this entry, sorted.
    pub fn language_codes(&self) -> impl Iterator<Item = &str> {
        self.languages.keys().map(String::as_str)
    }

    pub fn languages(&self) -> impl Iterator<Item = (&str, &LanguageResult)> {
        self.languages.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// The whole document, in source-word order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Corpus {
    entries: Vec<Entry>,
}

impl Corpus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_words<S: AsRef<str>>(words: &[S]) -> Self {
        let mut corpus = Self::new();
        for word in words {
            corpus.push_word(word.as_ref());
        }
        corpus
    }

    /// Append an entry for `original` unless one already exists.
    /// Returns the entry index.
    pub fn push_word(&mut self, original: &str) -> usize {
        if let Some(index) = self.position(original) {
            return index;
        }
        self.entries.push(Entry::new(original));
        self.entries.len() - 1
    }

    pub fn position(&self, original: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.original == original)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn entry_mut(&mut self, index: usize) -> Option<&mut Entry> {
        self.entries.get_mut(index)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize corpus")
    }
}

/// Reads and rewrites the corpus file.
#[derive(Debug, Clone)]
pub struct CorpusStore {
    path: PathBuf,
}

impl CorpusStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the corpus. A missing file is an empty corpus.
    pub fn load(&self) -> Result<Corpus> {
        if !self.path.exists() {
            debug!("No corpus at {}, starting empty", self.path.display());
            return Ok(Corpus::new());
        }

        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read corpus {}", self.path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse corpus {}", self.path.display()))
    }

    /// Load a corpus that must already exist. Passes that extend a corpus
    /// use this so a mistyped path fails instead of writing `[]`.
    pub fn load_existing(&self) -> Result<Corpus> {
        if !self.path.exists() {
            bail!("Corpus {} does not exist", self.path.display());
        }
        self.load()
    }

    /// Rewrite the whole file. The new content goes to a temporary file in the
    /// same directory which then replaces the old one, so an interrupted run
    /// never leaves a truncated corpus behind.
    pub fn save(&self, corpus: &Corpus) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;

        let mut json = corpus.to_json()?;
        json.push('\n');

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)
            .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
        tmp.write_all(json.as_bytes())
            .context("Failed to write corpus")?;
        tmp.persist(&self.path)
            .with_context(|| format!("Failed to replace corpus {}", self.path.display()))?;

        Ok(())
    }
}

/// Saves the corpus every `every` completed entries.
#[derive(Debug)]
pub struct Checkpointer {
    store: CorpusStore,
    every: usize,
    pending: usize,
    saves: usize,
}

impl Checkpointer {
    /// `every == 0` disables periodic saves; `finish` still writes.
    pub fn new(store: CorpusStore, every: usize) -> Self {
        Self {
            store,
            every,
            pending: 0,
            saves: 0,
        }
    }

    /// Record one completed entry, saving when the interval is reached.
    /// Returns whether a checkpoint was written.
    pub fn entry_done(&mut self, corpus: &Corpus, done: usize) -> Result<bool> {
        self.pending += 1;
        if self.every == 0 || self.pending < self.every {
            return Ok(false);
        }

        self.store.save(corpus)?;
        self.pending = 0;
        self.saves += 1;
        info!("Saved progress at entry {}", done);
        Ok(true)
    }

    /// Final save, regardless of the interval.
    pub fn finish(&mut self, corpus: &Corpus) -> Result<()> {
        self.store.save(corpus)?;
        self.pending = 0;
        self.saves += 1;
        Ok(())
    }

    pub fn saves(&self) -> usize {
        self.saves
    }
}
