//! Anthropic Messages API Provider
//!
//! Primary-role adapter. Composes requests with an explicit prompt-cache
//! marker on the system block so repeated static context is served from
//! the vendor cache. Cost is computed from the pricing table since the
//! API response does not carry USD amounts.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

use super::{ChatMessage, CompletionRequest, LlmProvider, ModelReply, TokenUsage, cost_for};
use crate::types::{ErrorClassifier, FathomError, Result};

const DEFAULT_API_BASE: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";

/// Anthropic Messages API provider with secure key handling.
pub struct AnthropicProvider {
    api_key: SecretString,
    api_base: String,
    model: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicProvider")
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .finish()
    }
}

impl AnthropicProvider {
    pub fn new(model: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let api_key_str = api_key
            .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
            .ok_or_else(|| {
                FathomError::Config(
                    "Anthropic API key not found. Set ANTHROPIC_API_KEY or provide in config"
                        .to_string(),
                )
            })?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(FathomError::Http)?;

        Ok(Self {
            api_key: SecretString::from(api_key_str),
            api_base: DEFAULT_API_BASE.to_string(),
            model: model.into(),
            client,
        })
    }

    /// System messages become the cached system block; the rest map to
    /// the messages array in their original order.
    fn build_request(&self, request: &CompletionRequest) -> MessagesRequest {
        let system: Vec<SystemBlock> = request
            .messages
            .iter()
            .filter(|m| m.role == "system")
            .map(|m| SystemBlock {
                block_type: "text".to_string(),
                text: m.content.clone(),
                cache_control: Some(CacheControl {
                    cache_type: "ephemeral".to_string(),
                }),
            })
            .collect();

        let messages: Vec<ApiMessage> = request
            .messages
            .iter()
            .filter(|m| m.role != "system")
            .map(|m: &ChatMessage| ApiMessage {
                role: m.role.clone(),
                content: m.content.clone(),
            })
            .collect();

        MessagesRequest {
            model: self.model.clone(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system,
            messages,
        }
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<ModelReply> {
        let started = Instant::now();
        let body = self.build_request(request);
        let url = format!("{}/messages", self.api_base);

        debug!(model = %self.model, intent = %request.intent, "sending Anthropic request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(ErrorClassifier::classify_http_status(status, &text, "anthropic").into());
        }

        let parsed: MessagesResponse = response.json().await?;

        let text = parsed
            .content
            .iter()
            .filter(|block| block.block_type == "text")
            .map(|block| block.text.as_str())
            .collect::<Vec<_>>()
            .join("");

        if text.is_empty() {
            return Err(ErrorClassifier::classify("empty response content", "anthropic").into());
        }

        let usage = TokenUsage {
            input_tokens: parsed.usage.input_tokens,
            output_tokens: parsed.usage.output_tokens,
            cached_tokens: parsed.usage.cache_read_input_tokens.unwrap_or(0),
        };

        Ok(ModelReply {
            cost_usd: cost_for(&self.model, &usage),
            text,
            usage,
            provider: "anthropic".to_string(),
            model: self.model.clone(),
            latency_ms: started.elapsed().as_millis() as u64,
        })
    }

    fn name(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// Request/Response types

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: usize,
    temperature: f32,
    system: Vec<SystemBlock>,
    messages: Vec<ApiMessage>,
}

#[derive(Debug, Serialize)]
struct SystemBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    cache_control: Option<CacheControl>,
}

#[derive(Debug, Serialize)]
struct CacheControl {
    #[serde(rename = "type")]
    cache_type: String,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: UsageInfo,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct UsageInfo {
    input_tokens: u64,
    output_tokens: u64,
    #[serde(default)]
    cache_read_input_tokens: Option<u64>,
}
