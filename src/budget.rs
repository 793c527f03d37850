//! Run Cost Budget
//!
//! Thread-safe cumulative cost and token tracking for one run. Cost is
//! stored in atomic microdollars so concurrent provider calls can report
//! usage without a lock. The tracker only *suggests* a degradation tier
//! from `fraction_used`; transitions are owned by the degradation
//! controller.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::constants::budget as budget_constants;
use crate::state::DegradationTier;

/// Thresholds driving warnings and tier suggestions.
#[derive(Debug, Clone)]
pub struct BudgetConfig {
    /// Maximum spend per run in USD
    pub max_cost: f64,
    /// Fraction at which a warning is logged
    pub warn_fraction: f64,
    /// Fraction at which REDUCED is suggested
    pub reduce_fraction: f64,
    /// Fraction at which CACHED is suggested
    pub cache_fraction: f64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_cost: budget_constants::DEFAULT_MAX_COST_USD,
            warn_fraction: budget_constants::WARN_FRACTION,
            reduce_fraction: budget_constants::REDUCE_FRACTION,
            cache_fraction: budget_constants::CACHE_FRACTION,
        }
    }
}

impl BudgetConfig {
    pub fn with_max_cost(max_cost: f64) -> Self {
        Self {
            max_cost,
            ..Default::default()
        }
    }
}

/// Per-provider usage breakdown.
#[derive(Debug, Clone, Default)]
pub struct ProviderUsage {
    pub calls: u64,
    pub cost_usd: f64,
    pub tokens: u64,
}

/// Cumulative cost/token tracker for a run.
#[derive(Debug)]
pub struct BudgetTracker {
    config: BudgetConfig,
    /// Total spend in microdollars
    cost_micros: AtomicU64,
    tokens: AtomicU64,
    per_provider: RwLock<HashMap<String, ProviderUsage>>,
    warn_emitted: AtomicBool,
}

impl BudgetTracker {
    pub fn new(config: BudgetConfig) -> Self {
        Self {
            config,
            cost_micros: AtomicU64::new(0),
            tokens: AtomicU64::new(0),
            per_provider: RwLock::new(HashMap::new()),
            warn_emitted: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &BudgetConfig {
        &self.config
    }

    /// Record usage from one provider call. Totals are monotonically
    /// non-decreasing; negative cost is clamped to zero.
    pub fn add(&self, cost_usd: f64, tokens: u64, provider: &str) {
        let micros = (cost_usd.max(0.0) * 1_000_000.0).round() as u64;
        let new_total = self.cost_micros.fetch_add(micros, Ordering::SeqCst) + micros;
        self.tokens.fetch_add(tokens, Ordering::SeqCst);

        {
            let mut map = self
                .per_provider
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let entry = map.entry(provider.to_string()).or_default();
            entry.calls += 1;
            entry.cost_usd += cost_usd.max(0.0);
            entry.tokens += tokens;
        }

        let fraction = self.fraction_of(new_total);
        if fraction >= self.config.warn_fraction
            && !self.warn_emitted.swap(true, Ordering::Relaxed)
        {
            tracing::warn!(
                spent_usd = new_total as f64 / 1_000_000.0,
                max_usd = self.config.max_cost,
                fraction = fraction,
                "run budget approaching limit"
            );
        }
    }

    /// Total spend in USD
    pub fn total_cost(&self) -> f64 {
        self.cost_micros.load(Ordering::SeqCst) as f64 / 1_000_000.0
    }

    /// Total tokens across all providers
    pub fn total_tokens(&self) -> u64 {
        self.tokens.load(Ordering::SeqCst)
    }

    /// Fraction of the budget consumed (may exceed 1.0)
    pub fn fraction_used(&self) -> f64 {
        self.fraction_of(self.cost_micros.load(Ordering::SeqCst))
    }

    fn fraction_of(&self, micros: u64) -> f64 {
        if self.config.max_cost <= 0.0 {
            return 1.0;
        }
        (micros as f64 / 1_000_000.0) / self.config.max_cost
    }

    /// Whether the budget is fully consumed
    pub fn exhausted(&self) -> bool {
        self.fraction_used() >= 1.0
    }

    /// Tier suggestion from spend alone. The degradation controller owns
    /// the actual transition (it also weighs provider failures).
    pub fn tier_suggestion(&self) -> DegradationTier {
        let fraction = self.fraction_used();
        if fraction >= 1.0 {
            DegradationTier::Partial
        } else if fraction >= self.config.cache_fraction {
            DegradationTier::Cached
        } else if fraction >= self.config.reduce_fraction {
            DegradationTier::Reduced
        } else {
            DegradationTier::Full
        }
    }

    /// Snapshot of per-provider usage
    pub fn provider_usage(&self) -> HashMap<String, ProviderUsage> {
        self.per_provider
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Payload for `budget_tick` events
    pub fn tick_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "total_cost_usd": self.total_cost(),
            "total_tokens": self.total_tokens(),
            "fraction_used": self.fraction_used(),
            "max_cost_usd": self.config.max_cost,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_add_accumulates() {
        let tracker = BudgetTracker::new(BudgetConfig::with_max_cost(1.0));
        tracker.add(0.10, 1000, "anthropic");
        tracker.add(0.05, 500, "openai");

        assert!((tracker.total_cost() - 0.15).abs() < 1e-9);
        assert_eq!(tracker.total_tokens(), 1500);
        assert!((tracker.fraction_used() - 0.15).abs() < 1e-9);
    }

    #[test]
    fn test_negative_cost_clamped() {
        let tracker = BudgetTracker::new(BudgetConfig::with_max_cost(1.0));
        tracker.add(0.10, 0, "anthropic");
        tracker.add(-5.0, 0, "anthropic");
        assert!((tracker.total_cost() - 0.10).abs() < 1e-9);
    }

    #[test]
    fn test_tier_suggestions() {
        let tracker = BudgetTracker::new(BudgetConfig::with_max_cost(1.0));
        assert_eq!(tracker.tier_suggestion(), DegradationTier::Full);

        tracker.add(0.80, 0, "a");
        assert_eq!(tracker.tier_suggestion(), DegradationTier::Reduced);

        tracker.add(0.15, 0, "a");
        assert_eq!(tracker.tier_suggestion(), DegradationTier::Cached);

        tracker.add(0.05, 0, "a");
        assert_eq!(tracker.tier_suggestion(), DegradationTier::Partial);
        assert!(tracker.exhausted());
    }

    #[test]
    fn test_scenario_budget_exceeded_walk() {
        // max 0.10, each call 0.06: FULL → (0.06) FULL → (0.12) over cap
        let tracker = BudgetTracker::new(BudgetConfig::with_max_cost(0.10));

        tracker.add(0.06, 100, "anthropic");
        assert_eq!(tracker.tier_suggestion(), DegradationTier::Full);

        tracker.add(0.06, 100, "anthropic");
        assert!(tracker.fraction_used() > 1.0);
        assert_eq!(tracker.tier_suggestion(), DegradationTier::Partial);
    }

    #[test]
    fn test_per_provider_breakdown() {
        let tracker = BudgetTracker::new(BudgetConfig::default());
        tracker.add(0.02, 100, "anthropic");
        tracker.add(0.01, 50, "anthropic");
        tracker.add(0.03, 10, "tavily");

        let usage = tracker.provider_usage();
        assert_eq!(usage["anthropic"].calls, 2);
        assert_eq!(usage["anthropic"].tokens, 150);
        assert_eq!(usage["tavily"].calls, 1);
    }

    #[test]
    fn test_concurrent_adds() {
        let tracker = Arc::new(BudgetTracker::new(BudgetConfig::with_max_cost(100.0)));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let tracker = Arc::clone(&tracker);
            handles.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    tracker.add(0.001, 10, "p");
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert!((tracker.total_cost() - 0.8).abs() < 1e-6);
        assert_eq!(tracker.total_tokens(), 8000);
    }

    #[test]
    fn test_zero_budget_is_exhausted() {
        let tracker = BudgetTracker::new(BudgetConfig::with_max_cost(0.0));
        assert!(tracker.exhausted());
        assert_eq!(tracker.tier_suggestion(), DegradationTier::Partial);
    }
}
