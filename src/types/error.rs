//! Unified Error Type System
//!
//! Centralized error types for the entire application.
//! Provides error classification for retry and fallback decisions.
//!
//! ## Error Categories
//!
//! - **Transient**: Temporary issues that may resolve (retry)
//! - **RateLimit**: API rate limiting (wait longer, then retry)
//! - **Permanent**: The call itself is wrong (do not retry)
//! - **Auth**: Authentication failures (fail fast, fall back)
//! - **Network**: Connectivity issues (retry with backoff)
//! - **Unavailable**: Provider down (fall back to next)
//!
//! ## Design Principles
//!
//! - Single unified error type (FathomError) for the entire application
//! - Category-based routing for retry and fallback decisions
//! - Search and scrape failures are recorded, never fatal to a run

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Error Categories
// =============================================================================

/// Error categories for retry and fallback routing on provider calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Rate limited - wait then retry same provider
    RateLimit,
    /// Temporary server issues - retry same provider
    Transient,
    /// Network/connectivity issues - retry with backoff
    Network,
    /// Authentication failed - fail fast, fall back
    Auth,
    /// Provider unavailable - fall back to next
    Unavailable,
    /// The request itself is wrong - do not retry it
    Permanent,
    /// Parsing the provider response failed - may retry once
    ParseError,
    /// Unknown error - conservative retry
    Unknown,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimit => write!(f, "RATE_LIMIT"),
            Self::Transient => write!(f, "TRANSIENT"),
            Self::Network => write!(f, "NETWORK"),
            Self::Auth => write!(f, "AUTH"),
            Self::Unavailable => write!(f, "UNAVAILABLE"),
            Self::Permanent => write!(f, "PERMANENT"),
            Self::ParseError => write!(f, "PARSE_ERROR"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

impl ErrorCategory {
    /// Check if this category is retryable on the same provider
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimit | Self::Transient | Self::Network | Self::ParseError | Self::Unknown
        )
    }

    /// Check if this category should advance the fallback chain
    pub fn should_fallback(&self) -> bool {
        matches!(self, Self::Auth | Self::Unavailable | Self::Permanent)
    }

    /// Get recommended retry delay for this category
    pub fn recommended_delay(&self) -> Duration {
        match self {
            Self::RateLimit => Duration::from_secs(30),
            Self::Network => Duration::from_secs(5),
            Self::Transient => Duration::from_secs(2),
            Self::ParseError => Duration::from_secs(1),
            _ => Duration::from_millis(500),
        }
    }
}

// =============================================================================
// Provider Error
// =============================================================================

/// Error from a single provider call with category and retry hints
#[derive(Debug, Clone)]
pub struct ProviderError {
    /// Error category for routing decisions
    pub category: ErrorCategory,
    /// Detailed error message
    pub message: String,
    /// Provider that produced the error
    pub provider: Option<String>,
    /// Suggested wait time before retry (if applicable)
    pub retry_after: Option<Duration>,
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(provider) = &self.provider {
            write!(f, "[{}:{}] {}", provider, self.category, self.message)
        } else {
            write!(f, "[{}] {}", self.category, self.message)
        }
    }
}

impl std::error::Error for ProviderError {}

impl ProviderError {
    /// Create a new provider error
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            provider: None,
            retry_after: None,
        }
    }

    /// Create error with provider context
    pub fn with_provider(
        category: ErrorCategory,
        message: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            category,
            message: message.into(),
            provider: Some(provider.into()),
            retry_after: None,
        }
    }

    /// Add provider context to existing error
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Add suggested retry delay
    pub fn retry_after(mut self, duration: Duration) -> Self {
        self.retry_after = Some(duration);
        self
    }

    /// Check if error is retryable on the same provider
    pub fn is_retryable(&self) -> bool {
        self.category.is_retryable()
    }

    /// Check if error should advance the fallback chain
    pub fn should_fallback(&self) -> bool {
        self.category.should_fallback()
    }

    /// Get recommended retry delay
    pub fn recommended_delay(&self) -> Duration {
        self.retry_after
            .unwrap_or_else(|| self.category.recommended_delay())
    }
}

// =============================================================================
// Error Classifier
// =============================================================================

/// Error classifier for retry/fallback routing
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classify an error message from any provider
    pub fn classify(message: &str, provider: &str) -> ProviderError {
        let lower = message.to_lowercase();

        // Rate limiting patterns
        if lower.contains("rate limit")
            || lower.contains("429")
            || lower.contains("too many requests")
            || lower.contains("quota exceeded")
        {
            return ProviderError::with_provider(ErrorCategory::RateLimit, message, provider)
                .retry_after(Duration::from_secs(30));
        }

        // Authentication patterns
        if lower.contains("auth")
            || lower.contains("401")
            || lower.contains("403")
            || lower.contains("api key")
            || lower.contains("invalid key")
            || lower.contains("unauthorized")
            || lower.contains("permission denied")
        {
            return ProviderError::with_provider(ErrorCategory::Auth, message, provider);
        }

        // Network patterns
        if lower.contains("network")
            || lower.contains("connection")
            || lower.contains("dns")
            || lower.contains("timeout")
            || lower.contains("timed out")
            || lower.contains("unreachable")
        {
            return ProviderError::with_provider(ErrorCategory::Network, message, provider)
                .retry_after(Duration::from_secs(5));
        }

        // Transient server-side patterns
        if lower.contains("500")
            || lower.contains("502")
            || lower.contains("503")
            || lower.contains("504")
            || lower.contains("overloaded")
            || lower.contains("server error")
            || lower.contains("temporary")
        {
            return ProviderError::with_provider(ErrorCategory::Transient, message, provider)
                .retry_after(Duration::from_secs(2));
        }

        // Provider unavailable patterns
        if lower.contains("not found")
            || lower.contains("404")
            || lower.contains("service unavailable")
            || lower.contains("unsupported model")
        {
            return ProviderError::with_provider(ErrorCategory::Unavailable, message, provider);
        }

        // Permanent request errors
        if lower.contains("400")
            || lower.contains("bad request")
            || lower.contains("invalid")
            || lower.contains("malformed")
        {
            return ProviderError::with_provider(ErrorCategory::Permanent, message, provider);
        }

        // Parse error patterns
        if lower.contains("parse")
            || lower.contains("json")
            || lower.contains("unexpected token")
        {
            return ProviderError::with_provider(ErrorCategory::ParseError, message, provider)
                .retry_after(Duration::from_secs(1));
        }

        ProviderError::with_provider(ErrorCategory::Unknown, message, provider)
    }

    /// Classify an HTTP status code directly (more accurate than string matching)
    pub fn classify_http_status(status: u16, message: &str, provider: &str) -> ProviderError {
        match status {
            429 => ProviderError::with_provider(ErrorCategory::RateLimit, message, provider)
                .retry_after(Duration::from_secs(30)),
            401 | 403 => ProviderError::with_provider(ErrorCategory::Auth, message, provider),
            400 | 422 => ProviderError::with_provider(ErrorCategory::Permanent, message, provider),
            500 | 502 | 503 | 504 | 529 => {
                ProviderError::with_provider(ErrorCategory::Transient, message, provider)
                    .retry_after(Duration::from_secs(5))
            }
            404 => ProviderError::with_provider(ErrorCategory::Unavailable, message, provider),
            _ => ProviderError::with_provider(ErrorCategory::Unknown, message, provider),
        }
    }
}

// =============================================================================
// Application Error
// =============================================================================

#[derive(Debug, Error)]
pub enum FathomError {
    // -------------------------------------------------------------------------
    // System Errors (auto From impl)
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // -------------------------------------------------------------------------
    // Provider Errors
    // -------------------------------------------------------------------------
    /// Structured provider error with category and retry hints
    #[error("provider error: {0}")]
    Provider(ProviderError),

    /// The whole model fallback chain failed for one logical call
    #[error("model call exhausted after {attempts} attempts ({intent})")]
    ModelCallExhausted { intent: String, attempts: usize },

    // -------------------------------------------------------------------------
    // Pipeline Errors
    // -------------------------------------------------------------------------
    /// Plan stage produced no parseable subtopics - fatal for the run
    #[error("plan invalid: {0}")]
    PlanInvalid(String),

    /// A single URL failed to scrape - recorded in state, never fatal
    #[error("scrape failed for {url}: {reason}")]
    ScrapeFailed { url: String, reason: String },

    /// Operation timeout with context
    #[error("timeout after {duration:?}: {operation}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    /// Cooperative shutdown was requested
    #[error("cancelled")]
    Cancelled,

    // -------------------------------------------------------------------------
    // Persistence Errors
    // -------------------------------------------------------------------------
    /// Checkpoint bytes do not match the integrity sidecar
    #[error("checkpoint corrupt: {path} (expected {expected}, got {actual})")]
    CheckpointCorrupt {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// No valid checkpoint exists for a resume request
    #[error("no valid checkpoint found in {0}")]
    CheckpointMissing(PathBuf),

    /// A schema migration could not be applied
    #[error("migration from schema v{from} failed: {reason}")]
    Migration { from: u32, reason: String },

    // -------------------------------------------------------------------------
    // Budget Errors
    // -------------------------------------------------------------------------
    #[error("budget exceeded: spent ${spent:.4} of ${budget:.2}")]
    BudgetExceeded { spent: f64, budget: f64 },

    // -------------------------------------------------------------------------
    // Domain Errors
    // -------------------------------------------------------------------------
    #[error("report error: {0}")]
    Report(String),

    #[error("config error: {0}")]
    Config(String),
}

impl From<ProviderError> for FathomError {
    fn from(err: ProviderError) -> Self {
        FathomError::Provider(err)
    }
}

pub type Result<T> = std::result::Result<T, FathomError>;

// =============================================================================
// Helper Functions
// =============================================================================

impl FathomError {
    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a scrape failure
    pub fn scrape_failed(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ScrapeFailed {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Check if this error is recoverable by retrying the same call
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Provider(e) => e.is_retryable(),
            Self::Timeout { .. } => true,
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// Check if this error is fatal for the whole run
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::PlanInvalid(_) | Self::Config(_) | Self::Cancelled
        )
    }
}

// =============================================================================
// Tests
// =============================================================================
