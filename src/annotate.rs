//! Pronunciation annotations: IPA via espeak-ng, or an English-style
//! respelling produced by an LLM.

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;
use tokio::process::Command;

use crate::chat::{ChatClient, Message};
use crate::corpus::LanguageResult;
use crate::errors::ProviderError;
use crate::languages::Language;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Annotation {
    Ipa(String),
    Respelling(String),
}

impl Annotation {
    /// Store the annotation in its field of `result`.
    pub fn apply_to(self, result: &mut LanguageResult) {
        match self {
            Annotation::Ipa(ipa) => result.ipa = Some(ipa),
            Annotation::Respelling(respelling) => result.respelling = Some(respelling),
        }
    }
}

#[async_trait]
pub trait Annotator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether `result` already carries this annotator's field.
    fn already_annotated(&self, result: &LanguageResult) -> bool;

    /// `Ok(None)` means the annotator had nothing to say about this word.
    async fn annotate(
        &self,
        text: &str,
        language: Language,
    ) -> Result<Option<Annotation>, ProviderError>;
}

/// Annotation disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAnnotator;

#[async_trait]
impl Annotator for NoAnnotator {
    fn name(&self) -> &'static str {
        "none"
    }

    fn already_annotated(&self, _: &LanguageResult) -> bool {
        true
    }

    async fn annotate(&self, _: &str, _: Language) -> Result<Option<Annotation>, ProviderError> {
        Ok(None)
    }
}

static VOICE_SWITCH_REGEX: OnceLock<Regex> = OnceLock::new();

/// Clean raw `espeak-ng --ipa` output: drop voice switch markers such as
/// `(en)`, keep stress marks, separate words by a single space.
fn normalize_ipa(raw: &str) -> Option<String> {
    let regex = VOICE_SWITCH_REGEX
        .get_or_init(|| Regex::new(r"\([a-z]{2,3}(-[a-z0-9]+)?\)").unwrap());
    let cleaned = regex.replace_all(raw, " ");
    let ipa = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    (!ipa.is_empty()).then_some(ipa)
}

/// IPA through the `espeak-ng` command line.
#[derive(Debug, Clone)]
pub struct EspeakAnnotator {
    program: String,
}

impl EspeakAnnotator {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for EspeakAnnotator {
    fn default() -> Self {
        Self::new("espeak-ng")
    }
}

#[async_trait]
impl Annotator for EspeakAnnotator {
    fn name(&self) -> &'static str {
        "espeak-ng"
    }

    fn already_annotated(&self, result: &LanguageResult) -> bool {
        result.ipa.is_some()
    }

    async fn annotate(
        &self,
        text: &str,
        language: Language,
    ) -> Result<Option<Annotation>, ProviderError> {
        let output = Command::new(&self.program)
            .args(["-q", "--ipa", "-v", language.espeak_voice()])
            .arg(text)
            .output()
            .await
            .map_err(|e| ProviderError::Process {
                program: self.program.clone(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(ProviderError::Process {
                program: self.program.clone(),
                message: format!(
                    "{}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(normalize_ipa(&stdout).map(Annotation::Ipa))
    }
}

const RESPELLING_SYSTEM_PROMPT: &str = r#"You are a multilingual phonetics specialist who rewrites foreign words so English speakers can pronounce them naturally.
- Use the language code you are given; if it is missing, infer the language from the text.
- Answer with a JSON object with a single field:
  { "respelling": "<english-like respelling>" }
- Use common English syllables with the stressed syllable in capitals (e.g. "kah-RAH-o-kay"). Do not use IPA.
- Keep the spaces of multi-word phrases and capitalize proper nouns.
- When the pronunciation is ambiguous, pick the most widely accepted variant."#;

fn build_respelling_user_prompt(text: &str, language: Language) -> String {
    format!("Text: {}\nWord language code: {}", text, language.code())
}

#[derive(Debug, Deserialize)]
struct RespellingResponse {
    #[serde(default)]
    respelling: Option<String>,
}

static CODE_FENCE_REGEX: OnceLock<Regex> = OnceLock::new();

/// Parse the model answer. Models sometimes wrap the object in a markdown
/// code fence even in JSON mode.
fn parse_respelling(content: &str) -> Result<Option<String>, serde_json::Error> {
    let regex = CODE_FENCE_REGEX
        .get_or_init(|| Regex::new(r"(?s)^\s*```(?:json)?\s*(.*?)\s*```\s*$").unwrap());
    let json = regex
        .captures(content)
        .and_then(|c| c.get(1))
        .map_or(content, |m| m.as_str());

    let response: RespellingResponse = serde_json::from_str(json.trim())?;
    Ok(response
        .respelling
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty()))
}

/// English-orthography respelling from a chat model.
#[derive(Debug, Clone)]
pub struct RespellingAnnotator {
    chat: ChatClient,
}

impl RespellingAnnotator {
    pub fn new(chat: ChatClient) -> Self {
        Self { chat }
    }
}

#[async_trait]
impl Annotator for RespellingAnnotator {
    fn name(&self) -> &'static str {
        "respelling"
    }

    fn already_annotated(&self, result: &LanguageResult) -> bool {
        result.respelling.is_some()
    }

    async fn annotate(
        &self,
        text: &str,
        language: Language,
    ) -> Result<Option<Annotation>, ProviderError> {
        let messages = [
            Message::system(RESPELLING_SYSTEM_PROMPT),
            Message::user(build_respelling_user_prompt(text, language)),
        ];
        let content = self.chat.complete(&messages, true).await?;

        let respelling = parse_respelling(&content).map_err(|e| {
            ProviderError::invalid("Chat", format!("respelling was not valid JSON ({}): {}", e, content))
        })?;
        Ok(respelling.map(Annotation::Respelling))
    }
}
