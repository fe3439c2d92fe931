//! Consistency checks for a finished corpus and its audio directory.
//!
//! Errors are problems the app would hit at runtime (a referenced file that
//! does not exist, two entries for one word). Warnings point at entries that
//! are incomplete but still usable.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use crate::corpus::Corpus;
use crate::languages::LanguageRegistry;
use crate::tts::audio_filename;

/// Validation report containing errors and warnings about a corpus.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// No errors and no warnings
    pub fn is_clean(&self) -> bool {
        !self.has_errors() && !self.has_warnings()
    }
}

pub struct CorpusValidator;

impl CorpusValidator {
    /// Check `corpus` against itself and against the files in `audio_dir`.
    ///
    /// A missing `audio_dir` is treated as empty.
    pub fn validate(corpus: &Corpus, audio_dir: &Path) -> Result<ValidationReport> {
        let mut report = ValidationReport::new();
        let registry = LanguageRegistry::get();
        let on_disk = list_audio_files(audio_dir)?;
        let mut referenced = HashSet::new();
        let mut seen = HashSet::new();

        for (index, entry) in corpus.entries().iter().enumerate() {
            let position = index + 1;
            let original = entry.original();
            if original.trim().is_empty() {
                report
                    .errors
                    .push(format!("Entry {} has no original word", position));
            } else if !seen.insert(original) {
                report
                    .errors
                    .push(format!("Entry {}: duplicate original '{}'", position, original));
            }

            for (code, result) in entry.languages() {
                let label = format!("'{}' [{}]", original, code);

                if registry.get_by_code(code).is_none() {
                    report
                        .warnings
                        .push(format!("{}: language is not in the registry", label));
                }

                match (&result.word, &result.text) {
                    (None, _) => report.warnings.push(format!("{}: no word", label)),
                    (Some(word), Some(text)) if word != text => report.warnings.push(format!(
                        "{}: word '{}' differs from text '{}'",
                        label, word, text
                    )),
                    _ => {}
                }

                if result.ipa.is_none() && result.respelling.is_none() {
                    report
                        .warnings
                        .push(format!("{}: no IPA or respelling", label));
                }

                let Some(audio) = &result.audio else {
                    continue;
                };
                referenced.insert(audio.clone());

                if !on_disk.contains(audio) {
                    report
                        .errors
                        .push(format!("{}: audio file {} is missing", label, audio));
                }
                if let Some(word) = result.spoken() {
                    let expected = audio_filename(original, code, word);
                    if *audio != expected {
                        report.errors.push(format!(
                            "{}: audio file {} should be named {}",
                            label, audio, expected
                        ));
                    }
                }
            }
        }

        for orphan in on_disk.iter().filter(|f| !referenced.contains(*f)) {
            report
                .warnings
                .push(format!("Audio file {} is not referenced by the corpus", orphan));
        }

        Ok(report)
    }
}

/// MP3 filenames directly inside `dir`, sorted.
fn list_audio_files(dir: &Path) -> Result<BTreeSet<String>> {
    if !dir.exists() {
        return Ok(BTreeSet::new());
    }

    let mut files = BTreeSet::new();
    let listing = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read audio directory {}", dir.display()))?;
    for item in listing {
        let item = item.with_context(|| format!("Failed to read audio directory {}", dir.display()))?;
        let path = item.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "mp3") {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                files.insert(name.to_string());
            }
        }
    }
    Ok(files)
}
