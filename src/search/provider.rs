//! Search Provider Adapters
//!
//! The [`SearchProvider`] trait is the interface the search service
//! consumes; the shipped adapter speaks the Tavily search API. Failures
//! are classified into [`crate::types::ProviderError`] so retry and
//! fallback routing work the same way as for model providers.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::types::{ErrorClassifier, FathomError, Result};

/// Search depth requested from the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchDepth {
    Basic,
    #[default]
    Advanced,
}

impl std::str::FromStr for SearchDepth {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "basic" => Ok(Self::Basic),
            "advanced" => Ok(Self::Advanced),
            other => Err(format!(
                "unknown search depth: {} (valid: basic, advanced)",
                other
            )),
        }
    }
}

/// One raw hit from a provider, before scoring filters and dedup.
#[derive(Debug, Clone)]
pub struct ProviderSearchHit {
    pub url: String,
    pub title: String,
    pub snippet: String,
    /// Relevance score in [0,1]
    pub score: f64,
}

/// Web search provider interface.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
        depth: SearchDepth,
    ) -> Result<Vec<ProviderSearchHit>>;

    /// Provider name for logging and error records
    fn name(&self) -> &str;
}

// =============================================================================
// Tavily Adapter
// =============================================================================

const TAVILY_API_BASE: &str = "https://api.tavily.com";

/// Tavily search API adapter.
pub struct TavilyProvider {
    api_key: SecretString,
    api_base: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for TavilyProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TavilyProvider")
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl TavilyProvider {
    pub fn new(api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let api_key_str = api_key
            .or_else(|| std::env::var("TAVILY_API_KEY").ok())
            .ok_or_else(|| {
                FathomError::Config(
                    "Tavily API key not found. Set TAVILY_API_KEY or provide in config".to_string(),
                )
            })?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(FathomError::Http)?;

        Ok(Self {
            api_key: SecretString::from(api_key_str),
            api_base: TAVILY_API_BASE.to_string(),
            client,
        })
    }
}

#[async_trait]
impl SearchProvider for TavilyProvider {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
        depth: SearchDepth,
    ) -> Result<Vec<ProviderSearchHit>> {
        debug!(query, max_results, ?depth, "tavily search");

        let body = TavilyRequest {
            api_key: self.api_key.expose_secret().to_string(),
            query: query.to_string(),
            max_results,
            search_depth: depth,
            include_answer: false,
        };

        let response = self
            .client
            .post(format!("{}/search", self.api_base))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(ErrorClassifier::classify_http_status(status, &text, "tavily").into());
        }

        let parsed: TavilyResponse = response.json().await?;

        Ok(parsed
            .results
            .into_iter()
            .map(|r| ProviderSearchHit {
                url: r.url,
                title: r.title,
                snippet: r.content,
                score: r.score.unwrap_or(0.0).clamp(0.0, 1.0),
            })
            .collect())
    }

    fn name(&self) -> &str {
        "tavily"
    }
}

#[derive(Debug, Serialize)]
struct TavilyRequest {
    api_key: String,
    query: String,
    max_results: usize,
    search_depth: SearchDepth,
    include_answer: bool,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    results: Vec<TavilyHit>,
}

#[derive(Debug, Deserialize)]
struct TavilyHit {
    url: String,
    title: String,
    content: String,
    score: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_parse() {
        assert_eq!("basic".parse::<SearchDepth>().unwrap(), SearchDepth::Basic);
        assert_eq!(
            "Advanced".parse::<SearchDepth>().unwrap(),
            SearchDepth::Advanced
        );
        assert!("deep".parse::<SearchDepth>().is_err());
    }

    #[test]
    fn test_depth_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&SearchDepth::Advanced).unwrap(),
            "\"advanced\""
        );
    }

    #[test]
    fn test_debug_redacts_key() {
        let provider = TavilyProvider::new(Some("tvly-secret".into()), Duration::from_secs(5))
            .unwrap();
        let debug = format!("{:?}", provider);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("tvly-secret"));
    }
}
