//! Language registry: the single source of truth for every language the
//! corpus can carry.
//!
//! Each entry knows the three codes the pipeline needs: the corpus key
//! (also the translation target), the espeak-ng voice used for IPA, and the
//! BCP-47 code used by the speech synthesizer.

use anyhow::{bail, Result};
use std::fmt;
use std::sync::OnceLock;

/// Metadata for one supported language.
#[derive(Debug, Clone)]
pub struct LanguageConfig {
    /// Corpus key and translation target (e.g. "es", "zh-cn")
    pub code: &'static str,

    /// English name (e.g. "Spanish")
    pub name: &'static str,

    /// espeak-ng voice for phonemization (e.g. "en-us", "cmn")
    pub espeak_voice: &'static str,

    /// BCP-47 code for speech synthesis (e.g. "es-ES")
    pub speech_code: &'static str,

    /// Whether this is the language the source words are written in
    pub is_source: bool,

    /// Whether the language is part of the default target list
    pub default_target: bool,
}

pub struct LanguageRegistry {
    languages: Vec<LanguageConfig>,
}

static REGISTRY: OnceLock<LanguageRegistry> = OnceLock::new();

impl LanguageRegistry {
    pub fn get() -> &'static LanguageRegistry {
        REGISTRY.get_or_init(|| LanguageRegistry {
            languages: default_languages(),
        })
    }

    /// Look up a language by its corpus code, ignoring ASCII case.
    pub fn get_by_code(&self, code: &str) -> Option<&LanguageConfig> {
        self.languages
            .iter()
            .find(|lang| lang.code.eq_ignore_ascii_case(code))
    }

    pub fn list_all(&self) -> Vec<&LanguageConfig> {
        self.languages.iter().collect()
    }

    /// Default targets in registry order.
    pub fn default_targets(&self) -> Vec<Language> {
        self.languages
            .iter()
            .filter(|lang| lang.default_target)
            .map(|lang| Language { code: lang.code })
            .collect()
    }

    /// # Panics
    /// Panics unless exactly one language is marked as the source.
    pub fn source(&self) -> &LanguageConfig {
        let sources: Vec<_> = self.languages.iter().filter(|l| l.is_source).collect();
        match sources.len() {
            1 => sources[0],
            0 => panic!("No source language found in registry"),
            _ => panic!("Multiple source languages found in registry"),
        }
    }
}

/// A language that has been validated against the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Language {
    code: &'static str,
}

impl Language {
    pub const ENGLISH: Language = Language { code: "en" };
    pub const SPANISH: Language = Language { code: "es" };

    pub fn from_code(code: &str) -> Result<Language> {
        match LanguageRegistry::get().get_by_code(code.trim()) {
            Some(config) => Ok(Language { code: config.code }),
            None => bail!("Unknown language code: '{}'", code),
        }
    }

    /// The language the source words are written in.
    pub fn source() -> Language {
        Language {
            code: LanguageRegistry::get().source().code,
        }
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    /// # Panics
    /// Panics if the code is not in the registry, which construction rules out.
    pub fn config(&self) -> &'static LanguageConfig {
        LanguageRegistry::get()
            .get_by_code(self.code)
            .expect("Language code should always be valid")
    }

    pub fn name(&self) -> &'static str {
        self.config().name
    }

    pub fn espeak_voice(&self) -> &'static str {
        self.config().espeak_voice
    }

    pub fn speech_code(&self) -> &'static str {
        self.config().speech_code
    }

    /// Code accepted by the Google translation endpoints. They want the
    /// region upper-cased ("zh-CN").
    pub fn translate_code(&self) -> String {
        match self.code.split_once('-') {
            Some((lang, region)) => format!("{}-{}", lang, region.to_ascii_uppercase()),
            None => self.code.to_string(),
        }
    }

    pub fn is_source(&self) -> bool {
        self.config().is_source
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code)
    }
}

/// Parse a comma separated list such as `"en, es,fr"`.
///
/// Blank items are dropped and duplicates keep their first position.
/// An empty result is an error.
pub fn parse_language_list(list: &str) -> Result<Vec<Language>> {
    let mut languages: Vec<Language> = Vec::new();
    for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let language = Language::from_code(item)?;
        if !languages.contains(&language) {
            languages.push(language);
        }
    }

    if languages.is_empty() {
        bail!("No target languages given");
    }
    Ok(languages)
}

/// Comma separated default target list, used as the `--langs` default.
pub fn default_language_list() -> String {
    LanguageRegistry::get()
        .default_targets()
        .iter()
        .map(|l| l.code())
        .collect::<Vec<_>>()
        .join(",")
}

fn lang(
    code: &'static str,
    name: &'static str,
    espeak_voice: &'static str,
    speech_code: &'static str,
) -> LanguageConfig {
    LanguageConfig {
        code,
        name,
        espeak_voice,
        speech_code,
        is_source: false,
        default_target: true,
    }
}

fn default_languages() -> Vec<LanguageConfig> {
    vec![
        LanguageConfig {
            is_source: true,
            ..lang("en", "English", "en-us", "en-US")
        },
        lang("es", "Spanish", "es", "es-ES"),
        lang("fr", "French", "fr-fr", "fr-FR"),
        lang("de", "German", "de", "de-DE"),
        lang("it", "Italian", "it", "it-IT"),
        lang("pt", "Portuguese", "pt", "pt-BR"),
        lang("ru", "Russian", "ru", "ru-RU"),
        lang("ja", "Japanese", "ja", "ja-JP"),
        lang("ko", "Korean", "ko", "ko-KR"),
        lang("zh-cn", "Chinese (Simplified)", "cmn", "cmn-CN"),
        lang("th", "Thai", "th", "th-TH"),
        lang("vi", "Vietnamese", "vi", "vi-VN"),
        lang("id", "Indonesian", "id", "id-ID"),
        lang("ms", "Malay", "ms", "ms-MY"),
        lang("tl", "Tagalog", "tl", "fil-PH"),
        lang("el", "Greek", "el", "el-GR"),
        lang("sv", "Swedish", "sv", "sv-SE"),
        lang("fi", "Finnish", "fi", "fi-FI"),
        lang("ar", "Arabic", "ar", "ar-XA"),
        lang("tr", "Turkish", "tr", "tr-TR"),
        lang("hi", "Hindi", "hi", "hi-IN"),
        lang("nl", "Dutch", "nl", "nl-NL"),
        lang("pl", "Polish", "pl", "pl-PL"),
        lang("hu", "Hungarian", "hu", "hu-HU"),
        lang("sw", "Swahili", "sw", "sw-KE"),
        lang("ha", "Hausa", "ha", "ha-NG"),
        LanguageConfig {
            default_target: false,
            ..lang("fil", "Filipino", "tl", "fil-PH")
        },
    ]
}
