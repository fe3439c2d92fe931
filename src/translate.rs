//! Translation providers.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::errors::{check_status, transport, ProviderError};
use crate::languages::Language;

pub const WEB_TRANSLATE_URL: &str = "https://translate.googleapis.com/translate_a/single";
pub const CLOUD_TRANSLATE_URL: &str = "https://translation.googleapis.com";

/// A translated word plus the provider's romanization, when it has one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    pub text: String,
    pub pronunciation: Option<String>,
}

#[async_trait]
pub trait Translator: Send + Sync {
    fn name(&self) -> &'static str;

    async fn translate(
        &self,
        text: &str,
        source: Language,
        target: Language,
    ) -> Result<Translation, ProviderError>;
}

fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .build()
        .context("Failed to build HTTP client")
}

/// The keyless `translate_a/single` endpoint (`client=gtx`).
#[derive(Debug, Clone)]
pub struct GoogleWebTranslator {
    client: reqwest::Client,
    url: String,
}

impl GoogleWebTranslator {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            url: url.into(),
        })
    }
}

/// Pull the translation and the target romanization out of the nested
/// array payload:
///
/// `[[["hola","hello",null,null,10],[null,null,"ola",null]],null,"en",...]`
///
/// Rows whose first cell is a string are translated segments. A row with a
/// null first cell carries the romanization in its third cell.
fn parse_web_response(body: &Value) -> Option<Translation> {
    let rows = body.get(0)?.as_array()?;

    let mut text = String::new();
    let mut pronunciation = None;
    for row in rows {
        match row.get(0) {
            Some(Value::String(segment)) => text.push_str(segment),
            Some(Value::Null) => {
                if let Some(romanized) = row.get(2).and_then(Value::as_str) {
                    pronunciation = Some(romanized.to_string());
                }
            }
            _ => {}
        }
    }

    let text = text.trim().to_string();
    if text.is_empty() {
        return None;
    }

    let pronunciation = pronunciation
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty() && !p.eq_ignore_ascii_case(&text));

    Some(Translation {
        text,
        pronunciation,
    })
}

#[async_trait]
impl Translator for GoogleWebTranslator {
    fn name(&self) -> &'static str {
        "Google Translate"
    }

    async fn translate(
        &self,
        text: &str,
        source: Language,
        target: Language,
    ) -> Result<Translation, ProviderError> {
        let service = self.name();
        let sl = source.translate_code();
        let tl = target.translate_code();

        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("client", "gtx"),
                ("sl", sl.as_str()),
                ("tl", tl.as_str()),
                ("dt", "t"),
                ("dt", "rm"),
                ("q", text),
            ])
            .send()
            .await
            .map_err(transport(service))?;

        let body: Value = check_status(service, response)
            .await?
            .json()
            .await
            .map_err(transport(service))?;

        parse_web_response(&body)
            .ok_or_else(|| ProviderError::invalid(service, format!("no translation in {}", body)))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TranslateTextRequest<'a> {
    contents: Vec<&'a str>,
    source_language_code: String,
    target_language_code: String,
    mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct TranslateTextResponse {
    #[serde(default)]
    translations: Vec<CloudTranslation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CloudTranslation {
    translated_text: String,
}

/// Google Cloud Translation v3 (`translateText`), authenticated with an
/// OAuth access token.
#[derive(Debug, Clone)]
pub struct CloudTranslator {
    client: reqwest::Client,
    endpoint: String,
    access_token: String,
    project_id: String,
}

impl CloudTranslator {
    pub fn new(
        base_url: &str,
        project_id: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Result<Self> {
        let project_id = project_id.into();
        let endpoint = format!(
            "{}/v3/projects/{}/locations/global:translateText",
            base_url.trim_end_matches('/'),
            project_id
        );
        Ok(Self {
            client: http_client()?,
            endpoint,
            access_token: access_token.into(),
            project_id,
        })
    }
}

#[async_trait]
impl Translator for CloudTranslator {
    fn name(&self) -> &'static str {
        "Cloud Translation"
    }

    async fn translate(
        &self,
        text: &str,
        source: Language,
        target: Language,
    ) -> Result<Translation, ProviderError> {
        let service = self.name();
        let request = TranslateTextRequest {
            contents: vec![text],
            source_language_code: source.translate_code(),
            target_language_code: target.translate_code(),
            mime_type: "text/plain",
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.access_token)
            .header("x-goog-user-project", &self.project_id)
            .json(&request)
            .send()
            .await
            .map_err(transport(service))?;

        let body: TranslateTextResponse = check_status(service, response)
            .await?
            .json()
            .await
            .map_err(transport(service))?;

        let translated = body
            .translations
            .into_iter()
            .next()
            .map(|t| t.translated_text.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ProviderError::invalid(service, "translation response was empty"))?;

        Ok(Translation {
            text: translated,
            pronunciation: None,
        })
    }
}
