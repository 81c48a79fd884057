//! Documentation backend abstraction and the Anthropic messages client.
//!
//! The [`DocBackend`] trait is the narrow seam to the LLM: a code unit in,
//! generated Markdown plus token counts out. Failures come back as
//! [`BackendError`] values already classified by [`BackendErrorKind`], so
//! the retry controller never inspects HTTP details.
//!
//! # Status classification
//!
//! - 429 → `RateLimited` (retryable)
//! - 529 / 5xx → `Overloaded` (retryable)
//! - 401 / 403 → `Auth` (fatal)
//! - other 4xx → `InvalidRequest` (fatal)
//! - transport timeout → `Timeout`, other transport errors → `Network`

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::BackendConfig;
use crate::error::{BackendError, BackendErrorKind, Error};

/// One successful generation from the backend.
#[derive(Debug, Clone)]
pub struct BackendResponse {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// The documentation backend: content (plus optional continuity context)
/// in, Markdown and token counts out.
#[async_trait]
pub trait DocBackend: Send + Sync {
    async fn generate(
        &self,
        content: &str,
        context: Option<&str>,
    ) -> Result<BackendResponse, BackendError>;
}

/// Backend client for the Anthropic messages API.
pub struct AnthropicBackend {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    max_output_tokens: u32,
}

impl AnthropicBackend {
    /// Build a client from config. The API key comes from the
    /// `ANTHROPIC_API_KEY` environment variable, never from the config file.
    pub fn new(config: &BackendConfig) -> Result<Self, Error> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| Error::Config("ANTHROPIC_API_KEY environment variable not set".into()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        info!(model = %config.model, "initialized documentation backend");

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key,
            model: config.model.clone(),
            max_output_tokens: config.max_output_tokens,
        })
    }

    fn build_prompt(content: &str, context: Option<&str>) -> String {
        let mut prompt = format!(
            "You are an expert technical writer. Generate clear, professional \
             Markdown documentation for the following Python code: a brief \
             overview, then purpose, parameters, return values, and notable \
             edge cases for each function and class.\n\n\
             ```python\n{content}\n```"
        );
        if let Some(context) = context {
            prompt.push_str("\n\nAdditional context:\n");
            prompt.push_str(context);
        }
        prompt
    }

    fn classify_status(status: u16) -> BackendErrorKind {
        match status {
            429 => BackendErrorKind::RateLimited,
            401 | 403 => BackendErrorKind::Auth,
            500..=599 => BackendErrorKind::Overloaded,
            _ => BackendErrorKind::InvalidRequest,
        }
    }
}

#[async_trait]
impl DocBackend for AnthropicBackend {
    async fn generate(
        &self,
        content: &str,
        context: Option<&str>,
    ) -> Result<BackendResponse, BackendError> {
        let prompt = Self::build_prompt(content, context);

        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_output_tokens,
            "messages": [{ "role": "user", "content": prompt }],
        });

        debug!(bytes = content.len(), "dispatching generation request");

        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                let kind = if e.is_timeout() {
                    BackendErrorKind::Timeout
                } else {
                    BackendErrorKind::Network
                };
                BackendError::new(kind, e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BackendError::with_status(
                Self::classify_status(status.as_u16()),
                status.as_u16(),
                message,
            ));
        }

        let json: serde_json::Value = response.json().await.map_err(|e| {
            BackendError::new(BackendErrorKind::Network, format!("invalid response body: {e}"))
        })?;

        parse_messages_response(&json)
    }
}

/// Extract text and usage from a messages API response.
fn parse_messages_response(json: &serde_json::Value) -> Result<BackendResponse, BackendError> {
    let text = json
        .get("content")
        .and_then(|c| c.as_array())
        .and_then(|blocks| blocks.first())
        .and_then(|block| block.get("text"))
        .and_then(|t| t.as_str())
        .ok_or_else(|| {
            BackendError::new(
                BackendErrorKind::InvalidRequest,
                "response missing content[0].text",
            )
        })?
        .to_string();

    let usage = json.get("usage");
    let input_tokens = usage
        .and_then(|u| u.get("input_tokens"))
        .and_then(|v| v.as_u64())
        .unwrap_or(0);
    let output_tokens = usage
        .and_then(|u| u.get("output_tokens"))
        .and_then(|v| v.as_u64())
        .unwrap_or(0);

    Ok(BackendResponse {
        text,
        input_tokens,
        output_tokens,
    })
}
