//! Global Constants
//!
//! Centralized constants for configuration and tuning.
//! All magic numbers should be defined here with documentation.

/// Model router constants
pub mod router {
    /// Maximum retry attempts per provider before advancing the chain
    pub const MAX_ATTEMPTS_PER_PROVIDER: u8 = 3;

    /// Base delay for exponential backoff (milliseconds)
    pub const BASE_DELAY_MS: u64 = 1_000;

    /// Maximum delay between retries (seconds)
    pub const MAX_DELAY_SECS: u64 = 30;

    /// Backoff multiplier
    pub const BACKOFF_FACTOR: f32 = 2.0;

    /// Default LLM request timeout (seconds)
    pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
}

/// Circuit breaker constants
pub mod circuit_breaker {
    /// Number of failures before opening circuit
    pub const FAILURE_THRESHOLD: u32 = 5;

    /// Duration to wait before attempting recovery (seconds)
    pub const RECOVERY_TIMEOUT_SECS: u64 = 30;

    /// Maximum requests allowed in half-open state
    pub const HALF_OPEN_MAX_REQUESTS: u32 = 3;

    /// Success threshold to close circuit from half-open
    pub const SUCCESS_THRESHOLD: u32 = 2;
}

/// Cost budget constants
pub mod budget {
    /// Default maximum spend per run (USD)
    pub const DEFAULT_MAX_COST_USD: f64 = 2.00;

    /// Fraction of budget at which a warning is emitted
    pub const WARN_FRACTION: f64 = 0.80;

    /// Fraction of budget at which the REDUCED tier is suggested
    pub const REDUCE_FRACTION: f64 = 0.80;

    /// Fraction of budget at which the CACHED tier is suggested
    pub const CACHE_FRACTION: f64 = 0.95;

    /// Fraction below which recovery one tier up is allowed
    pub const RECOVER_FRACTION: f64 = 0.75;

    /// Consecutive router exhaustions that force the CACHED tier
    pub const EXHAUSTION_LIMIT: u32 = 5;
}

/// Search service constants
pub mod search {
    /// Query expansions per subtopic at full tier
    pub const EXPANSIONS_FULL: usize = 3;

    /// Query expansions per subtopic at reduced tier
    pub const EXPANSIONS_REDUCED: usize = 2;

    /// Maximum concurrent outbound search calls
    pub const MAX_CONCURRENT: usize = 3;

    /// Minimum delay between search calls (milliseconds)
    pub const INTER_CALL_DELAY_MS: u64 = 500;

    /// Results below this relevance score are discarded
    pub const MIN_SCORE: f64 = 0.3;

    /// Maximum results requested per query
    pub const MAX_RESULTS: usize = 10;

    /// Per-call timeout (seconds)
    pub const TIMEOUT_SECS: u64 = 15;
}

/// Scraper constants
pub mod scrape {
    /// Pages below this quality score are dropped
    pub const QUALITY_REJECT: f64 = 0.3;

    /// Pages below this score (but above reject) are flagged
    pub const QUALITY_ACCEPT: f64 = 0.7;

    /// Quality below which the JS-capable fallback extractor is tried
    pub const FALLBACK_THRESHOLD: f64 = 0.4;

    /// Maximum concurrent scrape calls
    pub const MAX_CONCURRENT: usize = 4;

    /// Per-call timeout (seconds)
    pub const TIMEOUT_SECS: u64 = 30;

    /// Word count below which a page scores zero on length
    pub const MIN_WORDS: usize = 50;

    /// Word count at which the length heuristic saturates
    pub const FULL_WORDS: usize = 400;
}

/// Checkpoint store constants
pub mod checkpoint {
    /// Default number of checkpoints retained per run
    pub const DEFAULT_MAX_KEEP: usize = 5;

    /// Retention floor: a crash mid-write must leave one valid predecessor
    pub const MIN_KEEP: usize = 2;

    /// Current on-disk schema version
    pub const SCHEMA_VERSION: u32 = 2;
}

/// Planner constants
pub mod plan {
    /// Minimum subtopics a valid plan must contain
    pub const MIN_SUBTOPICS: usize = 1;

    /// Maximum subtopics kept from a plan
    pub const MAX_SUBTOPICS: usize = 7;
}

/// Report constants
pub mod report {
    /// Default cap on final report length (words)
    pub const MAX_WORDS: usize = 10_000;

    /// Target words per subtopic summary at full tier
    pub const SUMMARY_WORDS_FULL: usize = 300;

    /// Target words per subtopic summary at reduced tier
    pub const SUMMARY_WORDS_REDUCED: usize = 150;
}

/// Per-model pricing (USD per million tokens) used when the provider
/// response does not carry cost.
pub mod pricing {
    /// (model prefix, input $/Mtok, output $/Mtok)
    pub const RATES: &[(&str, f64, f64)] = &[
        ("claude-sonnet", 3.00, 15.00),
        ("claude-haiku", 0.80, 4.00),
        ("gpt-4o-mini", 0.15, 0.60),
        ("gpt-4o", 2.50, 10.00),
    ];

    /// Conservative defaults when a model has no table entry
    pub const DEFAULT_INPUT_PER_MTOK: f64 = 3.00;
    pub const DEFAULT_OUTPUT_PER_MTOK: f64 = 15.00;
}

/// Shutdown coordinator constants
pub mod shutdown {
    /// Window in which a second signal escalates to immediate abort (ms)
    pub const ESCALATION_WINDOW_MS: u64 = 2_000;
}
