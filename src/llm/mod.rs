//! LLM Provider Abstraction
//!
//! Defines the [`LlmProvider`] trait for text completion with usage
//! metrics, plus the role table (primary/fallback/budget) the model
//! router selects from.
//!
//! ## Modules
//!
//! - `router`: fallback chain with per-category retries and circuit breakers
//! - `circuit_breaker`: circuit breaker pattern for provider resilience
//! - `anthropic`: Anthropic Messages API adapter (primary role)
//! - `openai`: OpenAI-compatible Chat Completions adapter (fallback/budget)
//! - `validation`: tolerant JSON extraction from model output

mod anthropic;
mod circuit_breaker;
mod openai;
mod router;
pub mod validation;

pub use anthropic::AnthropicProvider;
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use openai::OpenAiProvider;
pub use router::{ModelRouter, ModelRouterBuilder, RouterConfig};

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::constants::pricing;
use crate::types::Result;

// =============================================================================
// Call Intents
// =============================================================================

/// What a model call is for; drives provider selection together with the
/// degradation tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallIntent {
    Plan,
    Summarize,
    Synthesize,
    Judge,
}

impl CallIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::Summarize => "summarize",
            Self::Synthesize => "synthesize",
            Self::Judge => "judge",
        }
    }
}

impl std::fmt::Display for CallIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Provider Roles
// =============================================================================

/// Role of a provider in the fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelRole {
    /// Highest-quality general model
    Primary,
    /// Secondary vendor, comparable capability
    Fallback,
    /// Cheap/fast model reserved for degraded tiers
    Budget,
}

impl std::fmt::Display for ModelRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Fallback => write!(f, "fallback"),
            Self::Budget => write!(f, "budget"),
        }
    }
}

// =============================================================================
// Messages
// =============================================================================

/// One chat message. Composition follows prompt-cache discipline: static
/// system prompt first, then append-only prior turns, then the dynamic
/// user message, so vendor cache markers stay stable across calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// Request handed to a provider adapter.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: usize,
    pub intent: CallIntent,
}

impl CompletionRequest {
    /// Compose in fixed order: system prompt, prior turns, user message.
    pub fn new(
        system: &str,
        prior_turns: &[ChatMessage],
        user: &str,
        intent: CallIntent,
    ) -> Self {
        let mut messages = Vec::with_capacity(prior_turns.len() + 2);
        messages.push(ChatMessage::system(system));
        messages.extend_from_slice(prior_turns);
        messages.push(ChatMessage::user(user));
        Self {
            messages,
            temperature: 0.1,
            max_tokens: 4096,
            intent,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

// =============================================================================
// Replies
// =============================================================================

/// Token usage metrics for cost tracking.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Tokens served from the vendor prompt cache, if reported
    #[serde(default)]
    pub cached_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Complete reply from one model call.
#[derive(Debug, Clone)]
pub struct ModelReply {
    pub text: String,
    pub usage: TokenUsage,
    pub provider: String,
    pub model: String,
    pub cost_usd: f64,
    pub latency_ms: u64,
}

/// Shared provider handle for concurrent use across stages.
pub type SharedLlmProvider = Arc<dyn LlmProvider + Send + Sync>;

// =============================================================================
// Provider Trait
// =============================================================================

/// Text completion provider with usage metrics.
///
/// Adapters classify their own HTTP failures into [`crate::types::ProviderError`]
/// so the router can make retry/fallback decisions without vendor knowledge.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Run one completion call.
    async fn complete(&self, request: &CompletionRequest) -> Result<ModelReply>;

    /// Provider name for logging and accounting
    fn name(&self) -> &str;

    /// Model id currently in use
    fn model(&self) -> &str;
}

// =============================================================================
// Pricing
// =============================================================================

/// Compute USD cost from the pricing table when the provider response
/// does not carry cost.
pub fn cost_for(model: &str, usage: &TokenUsage) -> f64 {
    let (input_rate, output_rate) = pricing::RATES
        .iter()
        .find(|(prefix, _, _)| model.starts_with(prefix))
        .map(|(_, i, o)| (*i, *o))
        .unwrap_or((
            pricing::DEFAULT_INPUT_PER_MTOK,
            pricing::DEFAULT_OUTPUT_PER_MTOK,
        ));

    (usage.input_tokens as f64 * input_rate + usage.output_tokens as f64 * output_rate)
        / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_display() {
        assert_eq!(CallIntent::Plan.to_string(), "plan");
        assert_eq!(CallIntent::Synthesize.to_string(), "synthesize");
    }

    #[test]
    fn test_message_composition_order() {
        let prior = vec![ChatMessage::user("earlier"), ChatMessage::system("note")];
        let request = CompletionRequest::new("sys", &prior, "now", CallIntent::Plan);

        assert_eq!(request.messages.len(), 4);
        assert_eq!(request.messages[0].role, "system");
        assert_eq!(request.messages[0].content, "sys");
        assert_eq!(request.messages[3].content, "now");
    }

    #[test]
    fn test_cost_for_known_model() {
        let usage = TokenUsage {
            input_tokens: 1_000_000,
            output_tokens: 1_000_000,
            cached_tokens: 0,
        };
        let cost = cost_for("claude-sonnet-4", &usage);
        assert!((cost - 18.0).abs() < 1e-9);
    }

    #[test]
    fn test_cost_for_unknown_model_uses_default() {
        let usage = TokenUsage {
            input_tokens: 2_000_000,
            output_tokens: 0,
            cached_tokens: 0,
        };
        let cost = cost_for("mystery-model", &usage);
        assert!((cost - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_token_usage_total() {
        let usage = TokenUsage {
            input_tokens: 100,
            output_tokens: 50,
            cached_tokens: 30,
        };
        assert_eq!(usage.total(), 150);
    }
}
