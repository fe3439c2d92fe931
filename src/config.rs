use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;

use crate::annotate::{Annotator, EspeakAnnotator, NoAnnotator, RespellingAnnotator};
use crate::chat::{ChatClient, DEFAULT_CHAT_MODEL, GEMINI_CHAT_URL};
use crate::languages::{default_language_list, parse_language_list, Language};
use crate::retry::RetryConfig;
use crate::translate::{
    CloudTranslator, GoogleWebTranslator, Translator, CLOUD_TRANSLATE_URL, WEB_TRANSLATE_URL,
};
use crate::tts::{CloudTtsSynthesizer, Synthesizer, TranslateTtsSynthesizer, CLOUD_TTS_URL, TRANSLATE_TTS_URL};

pub const DEFAULT_CORPUS_PATH: &str = "HelloGoodbye/app/src/main/assets/corpus.json";
pub const DEFAULT_AUDIO_DIR: &str = "HelloGoodbye/app/src/main/assets/audio_files";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TranslateProvider {
    /// Keyless translate.googleapis.com endpoint
    Web,
    /// Google Cloud Translation v3
    Cloud,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TtsProvider {
    /// Keyless translate_tts endpoint
    Web,
    /// Google Cloud Text-to-Speech
    Cloud,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AnnotatorKind {
    /// IPA from espeak-ng
    Ipa,
    /// English-style respelling from the chat model
    Respelling,
    /// No annotation
    None,
}

#[derive(Debug, Clone)]
pub struct Config {
    // Files
    pub corpus_path: PathBuf,
    pub audio_dir: PathBuf,
    pub words_file: Option<PathBuf>,

    // Languages
    pub target_langs: Vec<Language>,

    // Translation
    pub translate_provider: TranslateProvider,
    pub translate_api_url: Option<String>,

    // Google Cloud (translation and speech)
    pub google_cloud_project: Option<String>,
    pub google_access_token: Option<String>,

    // Speech
    pub tts_provider: TtsProvider,
    pub tts_api_url: Option<String>,

    // Annotation
    pub annotator: AnnotatorKind,
    pub espeak_bin: String,

    // Chat model (respelling)
    pub llm_api_key: Option<String>,
    pub llm_api_url: String,
    pub llm_model: String,

    // Batch behaviour
    pub checkpoint_every: usize,
    pub concurrency: usize,
    pub sleep_between: Duration,
    pub audio_delay: Duration,
    pub retries: u32,
    pub fail_fast: bool,
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_secs(key: &str, default: f64) -> Duration {
    let secs: f64 = env_parse(key, default);
    Duration::from_secs_f64(secs.max(0.0))
}

fn env_enum<T: ValueEnum>(key: &str, default: T) -> Result<T> {
    match env_opt(key) {
        Some(value) => T::from_str(&value, true)
            .map_err(|e| anyhow::anyhow!("Invalid {}: {}", key, e)),
        None => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let langs = env_opt("TARGET_LANGS").unwrap_or_else(default_language_list);

        Ok(Self {
            corpus_path: env_opt("CORPUS_PATH")
                .unwrap_or_else(|| DEFAULT_CORPUS_PATH.to_string())
                .into(),
            audio_dir: env_opt("AUDIO_DIR")
                .unwrap_or_else(|| DEFAULT_AUDIO_DIR.to_string())
                .into(),
            words_file: env_opt("WORDS_FILE").map(PathBuf::from),

            target_langs: parse_language_list(&langs).context("Invalid TARGET_LANGS")?,

            translate_provider: env_enum("TRANSLATE_PROVIDER", TranslateProvider::Web)?,
            translate_api_url: env_opt("TRANSLATE_API_URL"),

            google_cloud_project: env_opt("GOOGLE_CLOUD_PROJECT"),
            google_access_token: env_opt("GOOGLE_ACCESS_TOKEN"),

            tts_provider: env_enum("TTS_PROVIDER", TtsProvider::Web)?,
            tts_api_url: env_opt("TTS_API_URL"),

            annotator: env_enum("ANNOTATOR", AnnotatorKind::Ipa)?,
            espeak_bin: env_opt("ESPEAK_BIN").unwrap_or_else(|| "espeak-ng".to_string()),

            llm_api_key: env_opt("LLM_API_KEY").or_else(|| env_opt("GEMINI_API_KEY")),
            llm_api_url: env_opt("LLM_API_URL").unwrap_or_else(|| GEMINI_CHAT_URL.to_string()),
            llm_model: env_opt("LLM_MODEL").unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),

            checkpoint_every: env_parse("CHECKPOINT_EVERY", 10),
            concurrency: env_parse("CONCURRENCY", 1usize).max(1),
            sleep_between: env_secs("SLEEP_SECS", 0.0),
            audio_delay: env_secs("AUDIO_DELAY_SECS", 0.5),
            retries: env_parse("RETRIES", 3u32).max(1),
            fail_fast: env_parse("FAIL_FAST", false),
        })
    }

    /// Retry schedule for translation calls, sized by `retries`.
    pub fn translation_retry(&self) -> RetryConfig {
        RetryConfig::translation().with_max_attempts(self.retries)
    }

    /// Retry schedule for audio downloads, sized by `retries`.
    pub fn audio_retry(&self) -> RetryConfig {
        RetryConfig::audio_download().with_max_attempts(self.retries)
    }

    fn cloud_credentials(&self, what: &str) -> Result<(String, String)> {
        let project = self
            .google_cloud_project
            .clone()
            .with_context(|| format!("GOOGLE_CLOUD_PROJECT not set (required for cloud {})", what))?;
        let token = self
            .google_access_token
            .clone()
            .with_context(|| format!("GOOGLE_ACCESS_TOKEN not set (required for cloud {})", what))?;
        Ok((project, token))
    }

    pub fn translator(&self) -> Result<Box<dyn Translator>> {
        Ok(match self.translate_provider {
            TranslateProvider::Web => Box::new(GoogleWebTranslator::new(
                self.translate_api_url.as_deref().unwrap_or(WEB_TRANSLATE_URL),
            )?),
            TranslateProvider::Cloud => {
                let (project, token) = self.cloud_credentials("translation")?;
                Box::new(CloudTranslator::new(
                    self.translate_api_url.as_deref().unwrap_or(CLOUD_TRANSLATE_URL),
                    project,
                    token,
                )?)
            }
        })
    }

    pub fn synthesizer(&self) -> Result<Box<dyn Synthesizer>> {
        Ok(match self.tts_provider {
            TtsProvider::Web => Box::new(TranslateTtsSynthesizer::new(
                self.tts_api_url.as_deref().unwrap_or(TRANSLATE_TTS_URL),
            )?),
            TtsProvider::Cloud => {
                let (project, token) = self.cloud_credentials("speech")?;
                Box::new(CloudTtsSynthesizer::new(
                    self.tts_api_url.as_deref().unwrap_or(CLOUD_TTS_URL),
                    token,
                    Some(project),
                )?)
            }
        })
    }

    pub fn chat_client(&self) -> Result<ChatClient> {
        let Some(api_key) = self.llm_api_key.clone() else {
            bail!("LLM_API_KEY (or GEMINI_API_KEY) not set");
        };
        ChatClient::new(&self.llm_api_url, api_key, &self.llm_model)
    }

    pub fn annotator_of(&self, kind: AnnotatorKind) -> Result<Box<dyn Annotator>> {
        Ok(match kind {
            AnnotatorKind::Ipa => Box::new(EspeakAnnotator::new(&self.espeak_bin)),
            AnnotatorKind::Respelling => Box::new(RespellingAnnotator::new(self.chat_client()?)),
            AnnotatorKind::None => Box::new(NoAnnotator),
        })
    }
}

#[cfg(test)]
pub(crate) fn test_config(dir: &std::path::Path) -> Config {
    Config {
        corpus_path: dir.join("corpus.json"),
        audio_dir: dir.join("audio_files"),
        words_file: None,
        target_langs: vec![Language::ENGLISH, Language::SPANISH],
        translate_provider: TranslateProvider::Web,
        translate_api_url: None,
        google_cloud_project: None,
        google_access_token: None,
        tts_provider: TtsProvider::Web,
        tts_api_url: None,
        annotator: AnnotatorKind::None,
        espeak_bin: "espeak-ng".to_string(),
        llm_api_key: None,
        llm_api_url: GEMINI_CHAT_URL.to_string(),
        llm_model: DEFAULT_CHAT_MODEL.to_string(),
        checkpoint_every: 10,
        concurrency: 1,
        sleep_between: Duration::ZERO,
        audio_delay: Duration::ZERO,
        retries: 1,
        fail_fast: false,
    }
}
