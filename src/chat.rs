//! Minimal client for OpenAI-compatible chat completion endpoints.
//!
//! Defaults target Gemini's OpenAI compatibility layer.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::{check_status, transport, ProviderError};
use crate::retry::{with_retry_if, RetryConfig};

pub const GEMINI_CHAT_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions";
pub const DEFAULT_CHAT_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Clone, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ChatClient {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    retry: RetryConfig,
}

impl ChatClient {
    pub fn new(
        url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            url: url.into(),
            api_key: api_key.into(),
            model: model.into(),
            retry: RetryConfig::chat(),
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Send `messages` and return the first choice's content.
    ///
    /// `json_object` asks the model for a single JSON object response.
    pub async fn complete(
        &self,
        messages: &[Message],
        json_object: bool,
    ) -> Result<String, ProviderError> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            response_format: json_object.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        with_retry_if(
            &self.retry,
            "Chat completion",
            || self.send(&request),
            ProviderError::is_retryable,
        )
        .await
    }

    async fn send(&self, request: &ChatRequest<'_>) -> Result<String, ProviderError> {
        let service = "Chat";
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(transport(service))?;

        let chat: ChatResponse = check_status(service, response)
            .await?
            .json()
            .await
            .map_err(transport(service))?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::invalid(service, "response contained no choices"))
    }
}
