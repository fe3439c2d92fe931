//! Pronunciation audio synthesis and the audio file naming rule.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use crate::errors::{check_status, transport, ProviderError};
use crate::languages::Language;

pub const TRANSLATE_TTS_URL: &str = "https://translate.google.com/translate_tts";
pub const CLOUD_TTS_URL: &str = "https://texttospeech.googleapis.com/v1/text:synthesize";

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Turns a word into MP3 bytes.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    fn name(&self) -> &'static str;

    async fn synthesize(&self, text: &str, language: Language) -> Result<Vec<u8>, ProviderError>;
}

/// Keep alphanumerics, space, `-` and `_`; drop trailing whitespace; spaces
/// become underscores.
fn filename_part(text: &str) -> String {
    let kept: String = text
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    kept.trim_end().replace(' ', "_")
}

/// Deterministic audio filename for (original, language, word).
///
/// `original` and `language` are used as they appear in the corpus; only the
/// translated word is cleaned. The app bundle already ships files named this
/// way (`thank you_es_gracias.mp3`), and re-runs compute the same name to
/// skip words whose file exists.
pub fn audio_filename(original: &str, language: &str, word: &str) -> String {
    format!("{}_{}_{}.mp3", original, language, filename_part(word))
}

/// Write audio through a temporary file so an interrupted download never
/// leaves a partial MP3 that a later run would mistake for a finished one.
pub fn save_audio(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create audio directory {}", dir.display()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    tmp.write_all(bytes).context("Failed to write audio")?;
    tmp.persist(path)
        .with_context(|| format!("Failed to save audio {}", path.display()))?;
    Ok(())
}

/// The unauthenticated `translate_tts` endpoint used by the web translator.
#[derive(Debug, Clone)]
pub struct TranslateTtsSynthesizer {
    client: reqwest::Client,
    url: String,
}

impl TranslateTtsSynthesizer {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(BROWSER_USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Synthesizer for TranslateTtsSynthesizer {
    fn name(&self) -> &'static str {
        "Translate TTS"
    }

    async fn synthesize(&self, text: &str, language: Language) -> Result<Vec<u8>, ProviderError> {
        let service = self.name();
        let tl = language.translate_code();
        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("ie", "UTF-8"),
                ("q", text),
                ("tl", tl.as_str()),
                ("client", "tw-ob"),
            ])
            .send()
            .await
            .map_err(transport(service))?;

        let bytes = check_status(service, response)
            .await?
            .bytes()
            .await
            .map_err(transport(service))?;

        if bytes.is_empty() {
            return Err(ProviderError::invalid(service, "empty audio body"));
        }
        Ok(bytes.to_vec())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeRequest<'a> {
    input: SynthesisInput<'a>,
    voice: VoiceSelection<'a>,
    audio_config: AudioConfig,
}

#[derive(Debug, Serialize)]
struct SynthesisInput<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceSelection<'a> {
    language_code: &'a str,
    ssml_gender: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AudioConfig {
    audio_encoding: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    #[serde(default)]
    audio_content: String,
}

/// Google Cloud Text-to-Speech, neutral voice, MP3.
#[derive(Debug, Clone)]
pub struct CloudTtsSynthesizer {
    client: reqwest::Client,
    url: String,
    access_token: String,
    project_id: Option<String>,
}

impl CloudTtsSynthesizer {
    pub fn new(
        url: impl Into<String>,
        access_token: impl Into<String>,
        project_id: Option<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            url: url.into(),
            access_token: access_token.into(),
            project_id,
        })
    }
}

#[async_trait]
impl Synthesizer for CloudTtsSynthesizer {
    fn name(&self) -> &'static str {
        "Cloud TTS"
    }

    async fn synthesize(&self, text: &str, language: Language) -> Result<Vec<u8>, ProviderError> {
        let service = self.name();
        let request = SynthesizeRequest {
            input: SynthesisInput { text },
            voice: VoiceSelection {
                language_code: language.speech_code(),
                ssml_gender: "NEUTRAL",
            },
            audio_config: AudioConfig {
                audio_encoding: "MP3",
            },
        };

        let mut builder = self
            .client
            .post(&self.url)
            .bearer_auth(&self.access_token)
            .json(&request);
        if let Some(project) = &self.project_id {
            builder = builder.header("x-goog-user-project", project);
        }

        let response = builder.send().await.map_err(transport(service))?;
        let body: SynthesizeResponse = check_status(service, response)
            .await?
            .json()
            .await
            .map_err(transport(service))?;

        if body.audio_content.is_empty() {
            return Err(ProviderError::invalid(service, "response had no audioContent"));
        }
        base64::engine::general_purpose::STANDARD
            .decode(body.audio_content.as_bytes())
            .map_err(|e| ProviderError::invalid(service, format!("bad base64 audio: {}", e)))
    }
}
