//! Model Router
//!
//! One logical call fans out over the provider role table
//! (primary/fallback/budget) until a reply arrives or the chain is
//! exhausted. The starting provider comes from the degradation tier and
//! the call intent; failures are classified and routed:
//!
//! 1. Check the provider's circuit breaker
//! 2. Attempt the call under a timeout
//! 3. On transient failure, retry with exponential backoff and jitter
//! 4. On terminal failure, advance to the next provider (fresh retry budget)
//! 5. On chain exhaustion, return `ModelCallExhausted`
//!
//! Every attempt emits a paired `node_enter`/`node_exit` event tagged
//! with the provider, and usage is reported to the budget tracker before
//! a reply is returned.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use rand::Rng;
use serde_json::json;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use super::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, CompletionRequest, ModelReply, ModelRole,
    SharedLlmProvider,
};
use crate::budget::BudgetTracker;
use crate::constants::router as router_constants;
use crate::persist::{EventKind, EventLog};
use crate::state::DegradationTier;
use crate::types::{ErrorCategory, ErrorClassifier, FathomError, ProviderError, Result};

/// Router tuning knobs.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Retry attempts per provider before advancing the chain
    pub max_attempts_per_provider: u8,
    /// Base delay for exponential backoff
    pub base_delay: Duration,
    /// Cap on backoff delay
    pub max_delay: Duration,
    /// Backoff multiplier
    pub backoff_factor: f32,
    /// Per-call timeout
    pub call_timeout: Duration,
    /// Circuit breaker settings shared by all providers
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_attempts_per_provider: router_constants::MAX_ATTEMPTS_PER_PROVIDER,
            base_delay: Duration::from_millis(router_constants::BASE_DELAY_MS),
            max_delay: Duration::from_secs(router_constants::MAX_DELAY_SECS),
            backoff_factor: router_constants::BACKOFF_FACTOR,
            call_timeout: Duration::from_secs(router_constants::DEFAULT_TIMEOUT_SECS),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

struct RoutedProvider {
    provider: SharedLlmProvider,
    role: ModelRole,
}

/// Multi-provider model router with fallback, retries, and accounting.
pub struct ModelRouter {
    providers: Vec<RoutedProvider>,
    config: RouterConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    budget: Arc<BudgetTracker>,
    events: Option<Arc<EventLog>>,
}

impl ModelRouter {
    /// Run one logical call through the chain for the given tier.
    ///
    /// `parent_id` links the emitted attempt events to the enclosing
    /// stage in the event log.
    #[instrument(skip(self, request), fields(intent = %request.intent, tier = %tier))]
    pub async fn call(
        &self,
        request: &CompletionRequest,
        tier: DegradationTier,
        parent_id: Option<u64>,
    ) -> Result<ModelReply> {
        let chain = self.chain_for(tier, request);
        if chain.is_empty() {
            return Err(FathomError::Config("no model providers configured".into()));
        }

        let mut total_attempts = 0usize;
        let mut last_error: Option<FathomError> = None;

        for entry in chain {
            let provider = &entry.provider;
            let name = provider.name().to_string();

            // Clone the Arc out so no map guard is held across awaits
            let breaker = Arc::clone(
                &self
                    .breakers
                    .entry(name.clone())
                    .or_insert_with(|| {
                        Arc::new(CircuitBreaker::new(&name, self.config.circuit_breaker.clone()))
                    }),
            );

            if breaker.state() == CircuitState::Open {
                debug!(provider = %name, "skipping provider (circuit OPEN)");
                continue;
            }

            let mut delay = self.config.base_delay;

            for attempt in 1..=self.config.max_attempts_per_provider {
                if !breaker.allow_request() {
                    break;
                }

                total_attempts += 1;
                let enter_id = self.emit(
                    EventKind::NodeEnter,
                    &name,
                    parent_id,
                    json!({
                        "intent": request.intent.as_str(),
                        "role": entry.role.to_string(),
                        "model": provider.model(),
                        "attempt": attempt,
                    }),
                );

                let started = std::time::Instant::now();
                let outcome = tokio::time::timeout(self.config.call_timeout, provider.complete(request))
                    .await
                    .unwrap_or_else(|_| {
                        Err(FathomError::timeout(
                            format!("llm call to {}", name),
                            self.config.call_timeout,
                        ))
                    });

                match outcome {
                    Ok(reply) => {
                        breaker.record_success();
                        // Usage reaches the budget before the caller sees the reply
                        self.budget
                            .add(reply.cost_usd, reply.usage.total(), &name);

                        self.emit(
                            EventKind::NodeExit,
                            &name,
                            enter_id,
                            json!({
                                "ok": true,
                                "latency_ms": reply.latency_ms,
                                "cost_usd": reply.cost_usd,
                                "input_tokens": reply.usage.input_tokens,
                                "output_tokens": reply.usage.output_tokens,
                            }),
                        );

                        info!(
                            provider = %name,
                            attempts = total_attempts,
                            cost_usd = reply.cost_usd,
                            "model call succeeded"
                        );
                        return Ok(reply);
                    }
                    Err(err) => {
                        breaker.record_failure();
                        let classified = classify(&err, &name);

                        self.emit(
                            EventKind::NodeExit,
                            &name,
                            enter_id,
                            json!({
                                "ok": false,
                                "latency_ms": started.elapsed().as_millis() as u64,
                                "category": classified.category.to_string(),
                                "error": classified.message.clone(),
                            }),
                        );

                        warn!(
                            provider = %name,
                            attempt = attempt,
                            category = %classified.category,
                            error = %classified.message,
                            "provider attempt failed"
                        );

                        let advance = self
                            .route_failure(&classified, attempt, &mut delay)
                            .await;
                        last_error = Some(err);
                        if advance {
                            break;
                        }
                    }
                }
            }
            // Fresh retry budget for the next provider in the chain
        }

        Err(match last_error {
            Some(FathomError::Provider(err)) => FathomError::ModelCallExhausted {
                intent: format!("{} ({})", request.intent, err.message),
                attempts: total_attempts,
            },
            _ => FathomError::ModelCallExhausted {
                intent: request.intent.to_string(),
                attempts: total_attempts,
            },
        })
    }

    /// Decide retry-vs-advance for one classified failure, sleeping as
    /// needed. Returns `true` when the chain should advance.
    async fn route_failure(
        &self,
        classified: &ProviderError,
        attempt: u8,
        delay: &mut Duration,
    ) -> bool {
        if classified.should_fallback() {
            return true;
        }

        if attempt >= self.config.max_attempts_per_provider {
            return true;
        }

        match classified.category {
            ErrorCategory::RateLimit => {
                let wait = classified.recommended_delay();
                info!(wait_secs = wait.as_secs(), "rate limited, waiting before retry");
                sleep(wait).await;
            }
            _ => {
                let wait = *delay + random_jitter(*delay);
                debug!(delay_ms = wait.as_millis() as u64, "retrying after backoff");
                sleep(wait).await;
                *delay = next_backoff(*delay, self.config.backoff_factor, self.config.max_delay);
            }
        }
        false
    }

    /// Provider order for a tier/intent pair. Degraded tiers lead with
    /// the budget model; REDUCED keeps the primary for plan/synthesize
    /// where quality still pays for itself.
    fn chain_for(&self, tier: DegradationTier, request: &CompletionRequest) -> Vec<&RoutedProvider> {
        use super::CallIntent;

        let order: [ModelRole; 3] = match tier {
            DegradationTier::Full => [ModelRole::Primary, ModelRole::Fallback, ModelRole::Budget],
            DegradationTier::Reduced => match request.intent {
                CallIntent::Plan | CallIntent::Synthesize => {
                    [ModelRole::Primary, ModelRole::Fallback, ModelRole::Budget]
                }
                CallIntent::Summarize | CallIntent::Judge => {
                    [ModelRole::Budget, ModelRole::Fallback, ModelRole::Primary]
                }
            },
            DegradationTier::Cached | DegradationTier::Partial => {
                [ModelRole::Budget, ModelRole::Fallback, ModelRole::Primary]
            }
        };

        order
            .iter()
            .filter_map(|role| self.providers.iter().find(|p| p.role == *role))
            .collect()
    }

    fn emit(
        &self,
        kind: EventKind,
        provider: &str,
        parent_id: Option<u64>,
        payload: serde_json::Value,
    ) -> Option<u64> {
        let events = self.events.as_ref()?;
        match events.append(kind, &format!("llm:{}", provider), parent_id, payload) {
            Ok(id) => Some(id),
            Err(err) => {
                warn!(error = %err, "failed to append router event");
                None
            }
        }
    }

    /// Circuit state for a provider (diagnostics)
    pub fn circuit_state(&self, provider_name: &str) -> Option<CircuitState> {
        self.breakers.get(provider_name).map(|b| b.state())
    }
}

/// Extract a routable category from any error shape.
fn classify(err: &FathomError, provider: &str) -> ProviderError {
    match err {
        FathomError::Provider(p) => p.clone(),
        FathomError::Timeout { .. } => {
            ProviderError::with_provider(ErrorCategory::Transient, err.to_string(), provider)
        }
        other => ErrorClassifier::classify(&other.to_string(), provider),
    }
}

fn random_jitter(base: Duration) -> Duration {
    let max_jitter_ms = (base.as_millis() as u64) / 4;
    if max_jitter_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..max_jitter_ms))
}

fn next_backoff(current: Duration, factor: f32, max: Duration) -> Duration {
    std::cmp::min(Duration::from_secs_f32(current.as_secs_f32() * factor), max)
}

// =============================================================================
// Builder
// =============================================================================

/// Builder wiring providers into their chain roles.
pub struct ModelRouterBuilder {
    providers: Vec<RoutedProvider>,
    config: RouterConfig,
    budget: Option<Arc<BudgetTracker>>,
    events: Option<Arc<EventLog>>,
}

impl ModelRouterBuilder {
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
            config: RouterConfig::default(),
            budget: None,
            events: None,
        }
    }

    pub fn primary(mut self, provider: SharedLlmProvider) -> Self {
        self.providers.push(RoutedProvider {
            provider,
            role: ModelRole::Primary,
        });
        self
    }

    pub fn fallback(mut self, provider: SharedLlmProvider) -> Self {
        self.providers.push(RoutedProvider {
            provider,
            role: ModelRole::Fallback,
        });
        self
    }

    pub fn budget_model(mut self, provider: SharedLlmProvider) -> Self {
        self.providers.push(RoutedProvider {
            provider,
            role: ModelRole::Budget,
        });
        self
    }

    pub fn with_config(mut self, config: RouterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_budget(mut self, budget: Arc<BudgetTracker>) -> Self {
        self.budget = Some(budget);
        self
    }

    pub fn with_events(mut self, events: Arc<EventLog>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn build(self) -> ModelRouter {
        ModelRouter {
            providers: self.providers,
            config: self.config,
            breakers: DashMap::new(),
            budget: self
                .budget
                .unwrap_or_else(|| Arc::new(BudgetTracker::new(Default::default()))),
            events: self.events,
        }
    }
}

impl Default for ModelRouterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::BudgetConfig;
    use crate::llm::{CallIntent, LlmProvider, TokenUsage};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct MockProvider {
        name: String,
        failures_before_success: u32,
        calls: AtomicU32,
        category: ErrorCategory,
    }

    impl MockProvider {
        fn ok(name: &str) -> Self {
            Self {
                name: name.into(),
                failures_before_success: 0,
                calls: AtomicU32::new(0),
                category: ErrorCategory::Transient,
            }
        }

        fn flaky(name: &str, failures: u32) -> Self {
            Self {
                name: name.into(),
                failures_before_success: failures,
                calls: AtomicU32::new(0),
                category: ErrorCategory::Transient,
            }
        }

        fn broken(name: &str, category: ErrorCategory) -> Self {
            Self {
                name: name.into(),
                failures_before_success: u32::MAX,
                calls: AtomicU32::new(0),
                category,
            }
        }
    }

    #[async_trait]
    impl LlmProvider for MockProvider {
        async fn complete(&self, _request: &CompletionRequest) -> Result<ModelReply> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures_before_success {
                return Err(ProviderError::with_provider(
                    self.category,
                    "mock failure",
                    &self.name,
                )
                .into());
            }
            Ok(ModelReply {
                text: format!("reply from {}", self.name),
                usage: TokenUsage {
                    input_tokens: 100,
                    output_tokens: 50,
                    cached_tokens: 0,
                },
                provider: self.name.clone(),
                model: "mock-model".into(),
                cost_usd: 0.01,
                latency_ms: 5,
            })
        }

        fn name(&self) -> &str {
            &self.name
        }

        fn model(&self) -> &str {
            "mock-model"
        }
    }

    fn fast_config() -> RouterConfig {
        RouterConfig {
            max_attempts_per_provider: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_factor: 2.0,
            call_timeout: Duration::from_secs(5),
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: 10,
                ..Default::default()
            },
        }
    }

    fn request(intent: CallIntent) -> CompletionRequest {
        CompletionRequest::new("sys", &[], "user", intent)
    }

    #[tokio::test]
    async fn test_success_on_primary() {
        let router = ModelRouterBuilder::new()
            .primary(Arc::new(MockProvider::ok("primary")))
            .fallback(Arc::new(MockProvider::ok("fallback")))
            .with_config(fast_config())
            .build();

        let reply = router
            .call(&request(CallIntent::Plan), DegradationTier::Full, None)
            .await
            .unwrap();
        assert_eq!(reply.provider, "primary");
    }

    #[tokio::test]
    async fn test_retry_then_success() {
        let router = ModelRouterBuilder::new()
            .primary(Arc::new(MockProvider::flaky("flaky", 2)))
            .with_config(fast_config())
            .build();

        let reply = router
            .call(&request(CallIntent::Plan), DegradationTier::Full, None)
            .await
            .unwrap();
        assert_eq!(reply.provider, "flaky");
    }

    #[tokio::test]
    async fn test_fallback_on_terminal_failure() {
        let router = ModelRouterBuilder::new()
            .primary(Arc::new(MockProvider::broken("dead", ErrorCategory::Auth)))
            .fallback(Arc::new(MockProvider::ok("backup")))
            .with_config(fast_config())
            .build();

        let reply = router
            .call(&request(CallIntent::Plan), DegradationTier::Full, None)
            .await
            .unwrap();
        assert_eq!(reply.provider, "backup");
    }

    #[tokio::test]
    async fn test_exhaustion_error() {
        let router = ModelRouterBuilder::new()
            .primary(Arc::new(MockProvider::broken("a", ErrorCategory::Transient)))
            .fallback(Arc::new(MockProvider::broken("b", ErrorCategory::Transient)))
            .with_config(fast_config())
            .build();

        let result = router
            .call(&request(CallIntent::Synthesize), DegradationTier::Full, None)
            .await;
        assert!(matches!(
            result,
            Err(FathomError::ModelCallExhausted { .. })
        ));
    }

    #[tokio::test]
    async fn test_degraded_tier_prefers_budget_model() {
        let router = ModelRouterBuilder::new()
            .primary(Arc::new(MockProvider::ok("primary")))
            .budget_model(Arc::new(MockProvider::ok("cheap")))
            .with_config(fast_config())
            .build();

        let reply = router
            .call(
                &request(CallIntent::Summarize),
                DegradationTier::Cached,
                None,
            )
            .await
            .unwrap();
        assert_eq!(reply.provider, "cheap");
    }

    #[tokio::test]
    async fn test_reduced_keeps_primary_for_synthesize() {
        let router = ModelRouterBuilder::new()
            .primary(Arc::new(MockProvider::ok("primary")))
            .budget_model(Arc::new(MockProvider::ok("cheap")))
            .with_config(fast_config())
            .build();

        let synth = router
            .call(
                &request(CallIntent::Synthesize),
                DegradationTier::Reduced,
                None,
            )
            .await
            .unwrap();
        assert_eq!(synth.provider, "primary");

        let summ = router
            .call(
                &request(CallIntent::Summarize),
                DegradationTier::Reduced,
                None,
            )
            .await
            .unwrap();
        assert_eq!(summ.provider, "cheap");
    }

    #[tokio::test]
    async fn test_usage_reported_to_budget() {
        let budget = Arc::new(BudgetTracker::new(BudgetConfig::with_max_cost(1.0)));
        let router = ModelRouterBuilder::new()
            .primary(Arc::new(MockProvider::ok("primary")))
            .with_config(fast_config())
            .with_budget(Arc::clone(&budget))
            .build();

        router
            .call(&request(CallIntent::Plan), DegradationTier::Full, None)
            .await
            .unwrap();

        assert!((budget.total_cost() - 0.01).abs() < 1e-9);
        assert_eq!(budget.total_tokens(), 150);
    }

    #[tokio::test]
    async fn test_attempt_events_emitted() {
        let tmp = tempfile::TempDir::new().unwrap();
        let events = Arc::new(EventLog::open(&tmp.path().join("events.jsonl")).unwrap());
        let router = ModelRouterBuilder::new()
            .primary(Arc::new(MockProvider::flaky("flaky", 1)))
            .with_config(fast_config())
            .with_events(Arc::clone(&events))
            .build();

        router
            .call(&request(CallIntent::Plan), DegradationTier::Full, None)
            .await
            .unwrap();

        let entries = events.read_all().unwrap();
        let enters = entries
            .iter()
            .filter(|e| e.event == EventKind::NodeEnter)
            .count();
        let exits = entries
            .iter()
            .filter(|e| e.event == EventKind::NodeExit)
            .count();
        assert_eq!(enters, 2);
        assert_eq!(exits, 2);
        assert!(entries.iter().all(|e| e.node == "llm:flaky"));
    }

    #[test]
    fn test_backoff_helpers() {
        let next = next_backoff(Duration::from_secs(1), 2.0, Duration::from_secs(30));
        assert_eq!(next, Duration::from_secs(2));

        let capped = next_backoff(Duration::from_secs(25), 2.0, Duration::from_secs(30));
        assert_eq!(capped, Duration::from_secs(30));

        let jitter = random_jitter(Duration::from_millis(1000));
        assert!(jitter <= Duration::from_millis(250));
    }
}
