//! Configuration Types
//!
//! All configuration structures with sensible defaults.
//! Supports global (~/.config/fathom/) and project (.fathom/) level
//! configuration plus `FATHOM_*` environment overrides.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::constants::{
    budget as budget_constants, checkpoint as checkpoint_constants, report as report_constants,
    router as router_constants, scrape as scrape_constants, search as search_constants,
};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration version
    pub version: String,

    /// LLM provider settings
    pub llm: LlmConfig,

    /// Web search settings
    pub search: SearchSettings,

    /// Content extraction settings
    pub scrape: ScrapeSettings,

    /// Run cost budget settings
    pub costs: CostsConfig,

    /// Checkpoint persistence settings
    pub checkpoints: CheckpointsConfig,

    /// Report output settings
    pub report: ReportConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            llm: LlmConfig::default(),
            search: SearchSettings::default(),
            scrape: ScrapeSettings::default(),
            costs: CostsConfig::default(),
            checkpoints: CheckpointsConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    /// Returns `FathomError::Config` on validation failure.
    pub fn validate(&self) -> crate::types::Result<()> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(crate::types::FathomError::Config(format!(
                "llm.temperature must be between 0.0 and 2.0, got {}",
                self.llm.temperature
            )));
        }
        if self.llm.timeout_secs == 0 {
            return Err(crate::types::FathomError::Config(
                "llm.timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.costs.max_per_run <= 0.0 {
            return Err(crate::types::FathomError::Config(format!(
                "costs.max_per_run must be positive, got {}",
                self.costs.max_per_run
            )));
        }
        if !(0.0..=1.0).contains(&self.search.min_score) {
            return Err(crate::types::FathomError::Config(format!(
                "search.min_score must be in [0,1], got {}",
                self.search.min_score
            )));
        }
        if self.scrape.quality_reject >= self.scrape.quality_accept {
            return Err(crate::types::FathomError::Config(format!(
                "scrape.quality_reject ({}) must be below quality_accept ({})",
                self.scrape.quality_reject, self.scrape.quality_accept
            )));
        }
        if self.search.max_concurrent == 0 || self.scrape.max_concurrent == 0 {
            return Err(crate::types::FathomError::Config(
                "concurrency limits must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// LLM Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Primary (highest quality) model id
    pub primary_model: String,
    /// Secondary-vendor fallback model id
    pub fallback_model: String,
    /// Cheap model reserved for degraded tiers
    pub budget_model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Per-call timeout in seconds
    pub timeout_secs: u64,
    /// API keys resolved from env when absent; never serialized
    #[serde(default, skip_serializing)]
    pub anthropic_api_key: Option<String>,
    #[serde(default, skip_serializing)]
    pub openai_api_key: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            primary_model: "claude-sonnet-4-20250514".to_string(),
            fallback_model: "gpt-4o".to_string(),
            budget_model: "gpt-4o-mini".to_string(),
            temperature: 0.1,
            timeout_secs: router_constants::DEFAULT_TIMEOUT_SECS,
            anthropic_api_key: None,
            openai_api_key: None,
        }
    }
}

// =============================================================================
// Search Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub max_results: usize,
    /// "basic" or "advanced"
    pub depth: String,
    pub min_score: f64,
    pub max_concurrent: usize,
    pub inter_call_delay_ms: u64,
    #[serde(default, skip_serializing)]
    pub tavily_api_key: Option<String>,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            max_results: search_constants::MAX_RESULTS,
            depth: "advanced".to_string(),
            min_score: search_constants::MIN_SCORE,
            max_concurrent: search_constants::MAX_CONCURRENT,
            inter_call_delay_ms: search_constants::INTER_CALL_DELAY_MS,
            tavily_api_key: None,
        }
    }
}

// =============================================================================
// Scrape Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeSettings {
    pub quality_reject: f64,
    pub quality_accept: f64,
    pub timeout_secs: u64,
    pub max_concurrent: usize,
}

impl Default for ScrapeSettings {
    fn default() -> Self {
        Self {
            quality_reject: scrape_constants::QUALITY_REJECT,
            quality_accept: scrape_constants::QUALITY_ACCEPT,
            timeout_secs: scrape_constants::TIMEOUT_SECS,
            max_concurrent: scrape_constants::MAX_CONCURRENT,
        }
    }
}

// =============================================================================
// Costs Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CostsConfig {
    /// Maximum spend per run in USD
    pub max_per_run: f64,
    pub warn_fraction: f64,
}

impl Default for CostsConfig {
    fn default() -> Self {
        Self {
            max_per_run: budget_constants::DEFAULT_MAX_COST_USD,
            warn_fraction: budget_constants::WARN_FRACTION,
        }
    }
}

// =============================================================================
// Checkpoints Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointsConfig {
    /// Root directory holding one subdirectory per run
    pub dir: PathBuf,
    /// Checkpoints retained per run (floor of 2 applies)
    pub max_keep: usize,
}

impl Default for CheckpointsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".fathom/checkpoints"),
            max_keep: checkpoint_constants::DEFAULT_MAX_KEEP,
        }
    }
}

// =============================================================================
// Report Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub max_words: usize,
    pub output_dir: PathBuf,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            max_words: report_constants::MAX_WORDS,
            output_dir: PathBuf::from("."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_bad_temperature_rejected() {
        let mut config = Config::default();
        config.llm.temperature = 3.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_budget_rejected() {
        let mut config = Config::default();
        config.costs.max_per_run = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_inverted_quality_band_rejected() {
        let mut config = Config::default();
        config.scrape.quality_reject = 0.8;
        config.scrape.quality_accept = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_api_keys_never_serialized() {
        let mut config = Config::default();
        config.llm.anthropic_api_key = Some("sk-super-secret".into());
        config.search.tavily_api_key = Some("tvly-secret".into());

        let toml = toml::to_string(&config).unwrap();
        assert!(!toml.contains("sk-super-secret"));
        assert!(!toml.contains("tvly-secret"));
    }
}
