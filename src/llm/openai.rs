//! OpenAI Chat Completions Provider
//!
//! Serves the fallback and budget roles. Any OpenAI-compatible endpoint
//! works via `api_base`, so the budget role can point at a cheaper model
//! on the same adapter.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

use super::{CompletionRequest, LlmProvider, ModelReply, TokenUsage, cost_for};
use crate::types::{ErrorClassifier, FathomError, Result};

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// OpenAI-compatible provider with secure key handling.
pub struct OpenAiProvider {
    api_key: SecretString,
    api_base: String,
    model: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .finish()
    }
}

impl OpenAiProvider {
    pub fn new(
        model: impl Into<String>,
        api_key: Option<String>,
        api_base: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let api_key_str = api_key
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .ok_or_else(|| {
                FathomError::Config(
                    "OpenAI API key not found. Set OPENAI_API_KEY or provide in config".to_string(),
                )
            })?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(FathomError::Http)?;

        Ok(Self {
            api_key: SecretString::from(api_key_str),
            api_base: api_base.unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            model: model.into(),
            client,
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<ModelReply> {
        let started = Instant::now();
        let url = format!("{}/chat/completions", self.api_base);

        let body = ChatCompletionRequest {
            model: self.model.clone(),
            messages: request
                .messages
                .iter()
                .map(|m| ApiMessage {
                    role: m.role.clone(),
                    content: m.content.clone(),
                })
                .collect(),
            temperature: request.temperature,
            max_tokens: Some(request.max_tokens),
        };

        debug!(model = %self.model, intent = %request.intent, "sending OpenAI request");

        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(ErrorClassifier::classify_http_status(status, &text, "openai").into());
        }

        let parsed: ChatCompletionResponse = response.json().await?;

        let text = parsed
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| ErrorClassifier::classify("no content in response", "openai"))?;

        let usage = parsed
            .usage
            .map(|u| TokenUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
                cached_tokens: 0,
            })
            .unwrap_or_default();

        Ok(ModelReply {
            cost_usd: cost_for(&self.model, &usage),
            text,
            usage,
            provider: "openai".to_string(),
            model: self.model.clone(),
            latency_ms: started.elapsed().as_millis() as u64,
        })
    }

    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// Request/Response types

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ApiMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    usage: Option<UsageInfo>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageInfo {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_key() {
        let provider = OpenAiProvider::new(
            "gpt-4o-mini",
            Some("sk-secret".into()),
            None,
            Duration::from_secs(5),
        )
        .unwrap();

        let debug = format!("{:?}", provider);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("sk-secret"));
    }

    #[test]
    fn test_custom_api_base() {
        let provider = OpenAiProvider::new(
            "local-model",
            Some("key".into()),
            Some("http://localhost:8080/v1".into()),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(provider.api_base, "http://localhost:8080/v1");
    }
}
