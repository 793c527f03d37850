//! Degradation Controller
//!
//! Owns the FULL → REDUCED → CACHED → PARTIAL state machine. The budget
//! tracker only reports `fraction_used`; this controller folds in router
//! exhaustions and provider health, and is the single place a tier
//! transition happens.
//!
//! ```text
//! FULL    --(fraction >= 0.80)---------------------------> REDUCED
//! REDUCED --(fraction >= 0.95 OR 5 consecutive
//!            router exhaustions)------------------------->  CACHED
//! CACHED  --(all providers fail OR fraction >= 1.0)------> PARTIAL
//! ANY     --(fraction < 0.75 AND recent success)---------> one step up
//! ```

use crate::constants::budget as budget_constants;
use crate::state::DegradationTier;

/// One recorded tier transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierChange {
    pub from: DegradationTier,
    pub to: DegradationTier,
    pub reason: String,
}

impl TierChange {
    pub fn payload(&self) -> serde_json::Value {
        serde_json::json!({
            "from": self.from.to_string(),
            "to": self.to.to_string(),
            "reason": self.reason,
        })
    }
}

/// Tier state machine for one run.
#[derive(Debug)]
pub struct DegradationController {
    tier: DegradationTier,
    consecutive_exhaustions: u32,
    all_providers_failed: bool,
    recent_success: bool,
}

impl DegradationController {
    pub fn new(initial: DegradationTier) -> Self {
        Self {
            tier: initial,
            consecutive_exhaustions: 0,
            all_providers_failed: false,
            recent_success: false,
        }
    }

    pub fn tier(&self) -> DegradationTier {
        self.tier
    }

    /// A model call went through the whole chain and failed.
    pub fn record_exhaustion(&mut self) {
        self.consecutive_exhaustions += 1;
        self.recent_success = false;
    }

    /// Every provider in the chain is failing (an exhaustion observed
    /// while already in the CACHED tier, where the chain spans all of
    /// them).
    pub fn record_all_providers_failed(&mut self) {
        self.all_providers_failed = true;
        self.recent_success = false;
    }

    /// A model call succeeded; resets the exhaustion streak.
    pub fn record_success(&mut self) {
        self.consecutive_exhaustions = 0;
        self.all_providers_failed = false;
        self.recent_success = true;
    }

    /// Evaluate against the current budget fraction. Degradation may
    /// cascade several steps in one evaluation (each step is reported
    /// separately); recovery climbs at most one step.
    pub fn evaluate(&mut self, fraction_used: f64) -> Vec<TierChange> {
        let mut changes = Vec::new();

        loop {
            let next = match self.tier {
                DegradationTier::Full if fraction_used >= budget_constants::REDUCE_FRACTION => {
                    Some((DegradationTier::Reduced, format!(
                        "budget at {:.0}% of cap",
                        fraction_used * 100.0
                    )))
                }
                DegradationTier::Reduced
                    if fraction_used >= budget_constants::CACHE_FRACTION =>
                {
                    Some((DegradationTier::Cached, format!(
                        "budget at {:.0}% of cap",
                        fraction_used * 100.0
                    )))
                }
                DegradationTier::Reduced
                    if self.consecutive_exhaustions >= budget_constants::EXHAUSTION_LIMIT =>
                {
                    Some((DegradationTier::Cached, format!(
                        "{} consecutive router exhaustions",
                        self.consecutive_exhaustions
                    )))
                }
                DegradationTier::Cached if fraction_used >= 1.0 => {
                    Some((DegradationTier::Partial, "budget exhausted".to_string()))
                }
                DegradationTier::Cached if self.all_providers_failed => {
                    Some((DegradationTier::Partial, "all providers failing".to_string()))
                }
                _ => None,
            };

            match next {
                Some((to, reason)) => {
                    tracing::warn!(from = %self.tier, to = %to, reason = %reason, "tier degraded");
                    changes.push(TierChange {
                        from: self.tier,
                        to,
                        reason,
                    });
                    self.tier = to;
                }
                None => break,
            }
        }

        // Recovery: one step up when spend is back under the floor and
        // the last provider interaction succeeded.
        if changes.is_empty()
            && self.tier != DegradationTier::Full
            && fraction_used < budget_constants::RECOVER_FRACTION
            && self.recent_success
        {
            let to = self.tier.up();
            tracing::info!(from = %self.tier, to = %to, "tier recovered");
            changes.push(TierChange {
                from: self.tier,
                to,
                reason: format!("budget back under {:.0}%", budget_constants::RECOVER_FRACTION * 100.0),
            });
            self.tier = to;
            self.recent_success = false;
        }

        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stays_full_under_threshold() {
        let mut controller = DegradationController::new(DegradationTier::Full);
        assert!(controller.evaluate(0.5).is_empty());
        assert_eq!(controller.tier(), DegradationTier::Full);
    }

    #[test]
    fn test_full_to_reduced() {
        let mut controller = DegradationController::new(DegradationTier::Full);
        let changes = controller.evaluate(0.85);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].to, DegradationTier::Reduced);
        assert_eq!(controller.tier(), DegradationTier::Reduced);
    }

    #[test]
    fn test_cascade_on_blown_budget() {
        // Budget jumps straight past every threshold: each step is a
        // separately reported transition
        let mut controller = DegradationController::new(DegradationTier::Full);
        let changes = controller.evaluate(1.2);

        let path: Vec<DegradationTier> = changes.iter().map(|c| c.to).collect();
        assert_eq!(
            path,
            vec![
                DegradationTier::Reduced,
                DegradationTier::Cached,
                DegradationTier::Partial
            ]
        );
        assert_eq!(controller.tier(), DegradationTier::Partial);
    }

    #[test]
    fn test_exhaustions_force_cached() {
        let mut controller = DegradationController::new(DegradationTier::Reduced);
        for _ in 0..5 {
            controller.record_exhaustion();
        }
        let changes = controller.evaluate(0.85);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].to, DegradationTier::Cached);
        assert!(changes[0].reason.contains("exhaustions"));
    }

    #[test]
    fn test_all_providers_failed_forces_partial() {
        let mut controller = DegradationController::new(DegradationTier::Cached);
        controller.record_all_providers_failed();

        let changes = controller.evaluate(0.85);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].to, DegradationTier::Partial);
    }

    #[test]
    fn test_success_resets_exhaustion_streak() {
        let mut controller = DegradationController::new(DegradationTier::Reduced);
        for _ in 0..4 {
            controller.record_exhaustion();
        }
        controller.record_success();
        controller.record_exhaustion();

        assert!(controller.evaluate(0.85).is_empty());
        assert_eq!(controller.tier(), DegradationTier::Reduced);
    }

    #[test]
    fn test_recovery_one_step_with_success() {
        let mut controller = DegradationController::new(DegradationTier::Cached);
        controller.record_success();

        let changes = controller.evaluate(0.5);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].to, DegradationTier::Reduced);

        // A second evaluation without a fresh success does not climb
        assert!(controller.evaluate(0.5).is_empty());
    }

    #[test]
    fn test_no_recovery_without_success() {
        let mut controller = DegradationController::new(DegradationTier::Reduced);
        assert!(controller.evaluate(0.5).is_empty());
        assert_eq!(controller.tier(), DegradationTier::Reduced);
    }

    #[test]
    fn test_change_payload() {
        let change = TierChange {
            from: DegradationTier::Full,
            to: DegradationTier::Reduced,
            reason: "budget at 85% of cap".into(),
        };
        let payload = change.payload();
        assert_eq!(payload["from"], "FULL");
        assert_eq!(payload["to"], "REDUCED");
    }
}
