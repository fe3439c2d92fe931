//! Errors raised by the remote providers (translation, speech, chat).
//!
//! Providers return `ProviderError` so the retry layer can tell transient
//! failures from permanent ones without parsing message strings.

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    /// The service answered with a non-success status.
    #[error("{service} API error ({status}): {body}")]
    Api {
        service: &'static str,
        status: StatusCode,
        body: String,
    },

    /// The request never produced a response (connect error, timeout, ...).
    #[error("{service} request failed: {source}")]
    Transport {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// The service answered 2xx but the payload was not what we expected.
    #[error("{service} returned an unexpected response: {message}")]
    InvalidResponse {
        service: &'static str,
        message: String,
    },

    /// A local helper process (espeak-ng) failed.
    #[error("{program} failed: {message}")]
    Process { program: String, message: String },
}

impl ProviderError {
    pub fn invalid(service: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            service,
            message: message.into(),
        }
    }

    /// Retry 429 (rate limit), 5xx and network failures.
    /// Other 4xx client errors and malformed payloads are permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Api { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            Self::Transport { .. } => true,
            Self::InvalidResponse { .. } | Self::Process { .. } => false,
        }
    }
}

/// Turn a non-success response into `ProviderError::Api`, keeping the body
/// for the log line.
pub(crate) async fn check_status(
    service: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|e| format!("<failed to read body: {}>", e));
    Err(ProviderError::Api {
        service,
        status,
        body,
    })
}

/// Adapter for `.map_err` on reqwest futures.
pub(crate) fn transport(service: &'static str) -> impl FnOnce(reqwest::Error) -> ProviderError {
    move |source| ProviderError::Transport { service, source }
}
