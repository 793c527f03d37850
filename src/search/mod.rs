//! Search Service
//!
//! Per-subtopic search pipeline: expand the subtopic into queries,
//! execute each under a concurrency semaphore with a minimum inter-call
//! delay, retry transient failures, fall through the provider chain per
//! query, then deduplicate against the run-wide seen set with normalized
//! URLs and drop low-relevance hits.
//!
//! A subtopic whose every query fails is reported as failed; the run
//! itself never aborts here.

pub mod provider;
pub mod url_norm;

pub use provider::{ProviderSearchHit, SearchDepth, SearchProvider, TavilyProvider};
pub use url_norm::normalize;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::constants::search as search_constants;
use crate::llm::{CallIntent, CompletionRequest, ModelRouter, validation};
use crate::state::{DegradationTier, RunError, SearchResult, Subtopic};
use crate::types::Result;

/// Search service tuning.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub max_results: usize,
    pub depth: SearchDepth,
    pub min_score: f64,
    pub max_concurrent: usize,
    pub inter_call_delay: Duration,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_results: search_constants::MAX_RESULTS,
            depth: SearchDepth::Advanced,
            min_score: search_constants::MIN_SCORE,
            max_concurrent: search_constants::MAX_CONCURRENT,
            inter_call_delay: Duration::from_millis(search_constants::INTER_CALL_DELAY_MS),
        }
    }
}

/// Outcome of searching one subtopic.
#[derive(Debug, Default)]
pub struct SearchOutcome {
    /// Deduplicated, score-filtered results, descending by score
    pub results: Vec<SearchResult>,
    /// Normalized URLs observed (union into run-wide `seen_urls`)
    pub seen: BTreeSet<String>,
    /// Non-fatal failures for the error accumulator
    pub errors: Vec<RunError>,
    /// Whether every query failed or returned nothing
    pub exhausted: bool,
}

/// Per-subtopic web search with expansion, dedup, and provider fallback.
pub struct SearchService {
    providers: Vec<Arc<dyn SearchProvider>>,
    router: Arc<ModelRouter>,
    config: SearchConfig,
    semaphore: Arc<Semaphore>,
}

impl SearchService {
    /// `providers` is the fallback chain tried per query, in order.
    pub fn new(
        providers: Vec<Arc<dyn SearchProvider>>,
        router: Arc<ModelRouter>,
        config: SearchConfig,
    ) -> Self {
        let permits = config.max_concurrent.max(1);
        Self {
            providers,
            router,
            config,
            semaphore: Arc::new(Semaphore::new(permits)),
        }
    }

    /// Search one subtopic against the run-wide seen set.
    pub async fn search(
        &self,
        subtopic: &Subtopic,
        seen_urls: &BTreeSet<String>,
        tier: DegradationTier,
        parent_id: Option<u64>,
    ) -> SearchOutcome {
        let mut outcome = SearchOutcome::default();

        let queries = match self.expand_queries(subtopic, tier, parent_id).await {
            Ok(queries) if !queries.is_empty() => queries,
            Ok(_) | Err(_) if !subtopic.search_queries.is_empty() => {
                subtopic.search_queries.clone()
            }
            Ok(_) => vec![subtopic.title.clone()],
            Err(err) => {
                warn!(subtopic = %subtopic.id, error = %err, "query expansion failed, using title");
                outcome.errors.push(
                    RunError::new("search", format!("query expansion failed: {}", err))
                        .subtopic(&subtopic.id),
                );
                vec![subtopic.title.clone()]
            }
        };

        debug!(subtopic = %subtopic.id, queries = queries.len(), "executing search queries");

        let mut tasks = FuturesUnordered::new();
        for (index, query) in queries.iter().enumerate() {
            let semaphore = Arc::clone(&self.semaphore);
            let delay = self.config.inter_call_delay * index as u32;
            let query = query.clone();
            tasks.push(async move {
                // Stagger starts to honor the minimum inter-call delay
                tokio::time::sleep(delay).await;
                let _permit = semaphore.acquire().await;
                let hits = self.query_with_fallback(&query).await;
                (query, hits)
            });
        }

        let mut batch_seen: BTreeSet<String> = BTreeSet::new();
        let mut any_hits = false;

        while let Some((query, result)) = tasks.next().await {
            match result {
                Ok(hits) => {
                    if !hits.is_empty() {
                        any_hits = true;
                    }
                    for hit in hits {
                        let normalized = normalize(&hit.url);
                        outcome.seen.insert(normalized.clone());

                        if hit.score < self.config.min_score {
                            continue;
                        }
                        if seen_urls.contains(&normalized) || !batch_seen.insert(normalized) {
                            continue;
                        }
                        outcome.results.push(SearchResult {
                            url: hit.url,
                            title: hit.title,
                            snippet: hit.snippet,
                            score: hit.score,
                            subtopic_id: subtopic.id.clone(),
                        });
                    }
                }
                Err(err) => {
                    warn!(subtopic = %subtopic.id, query = %query, error = %err, "query failed");
                    outcome.errors.push(
                        RunError::new("search", err.to_string()).subtopic(&subtopic.id),
                    );
                }
            }
        }

        outcome.results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        outcome.exhausted = !any_hits;

        info!(
            subtopic = %subtopic.id,
            results = outcome.results.len(),
            errors = outcome.errors.len(),
            "search complete"
        );
        outcome
    }

    /// Run one query through the provider chain, retrying transient
    /// failures on each provider before advancing.
    async fn query_with_fallback(&self, query: &str) -> Result<Vec<ProviderSearchHit>> {
        let mut last_error = None;

        for provider in &self.providers {
            let attempt = || async {
                provider
                    .search(query, self.config.max_results, self.config.depth)
                    .await
            };

            let result = attempt
                .retry(
                    ExponentialBuilder::default()
                        .with_min_delay(Duration::from_secs(1))
                        .with_max_delay(Duration::from_secs(30))
                        .with_jitter()
                        .with_max_times(2),
                )
                .when(|err| err.is_recoverable())
                .await;

            match result {
                Ok(hits) => return Ok(hits),
                Err(err) => {
                    warn!(provider = provider.name(), query, error = %err, "search provider failed");
                    last_error = Some(err);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            crate::types::FathomError::Config("no search providers configured".into())
        }))
    }

    /// Expand a subtopic into k queries via the model router: one
    /// direct, one broader, one narrower (k shrinks with the tier).
    /// Planned queries are used as-is when the plan already carried
    /// enough of them.
    async fn expand_queries(
        &self,
        subtopic: &Subtopic,
        tier: DegradationTier,
        parent_id: Option<u64>,
    ) -> Result<Vec<String>> {
        let k = match tier {
            DegradationTier::Full => search_constants::EXPANSIONS_FULL,
            _ => search_constants::EXPANSIONS_REDUCED,
        };

        if subtopic.search_queries.len() >= k {
            return Ok(subtopic.search_queries[..k].to_vec());
        }

        let prompt = format!(
            "Produce exactly {k} web search queries for researching the subtopic below: \
             the first direct, then one broader, then one narrower. \
             Respond with a JSON array of strings only.\n\n\
             Subtopic: {}\nContext: {}",
            subtopic.title, subtopic.description
        );
        let request = CompletionRequest::new(
            "You generate precise web search queries.",
            &[],
            &prompt,
            CallIntent::Judge,
        );

        let reply = self.router.call(&request, tier, parent_id).await?;
        let mut queries = validation::extract_string_array(&reply.text)?;
        queries.truncate(k);
        Ok(queries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ModelRouterBuilder;
    use crate::types::{ErrorCategory, ProviderError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct StubSearch {
        name: String,
        hits: Vec<ProviderSearchHit>,
        fail: bool,
        calls: AtomicU32,
    }

    impl StubSearch {
        fn with_hits(name: &str, hits: Vec<ProviderSearchHit>) -> Arc<Self> {
            Arc::new(Self {
                name: name.into(),
                hits,
                fail: false,
                calls: AtomicU32::new(0),
            })
        }

        fn failing(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.into(),
                hits: Vec::new(),
                fail: true,
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl SearchProvider for StubSearch {
        async fn search(
            &self,
            _query: &str,
            _max_results: usize,
            _depth: SearchDepth,
        ) -> Result<Vec<ProviderSearchHit>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ProviderError::with_provider(
                    ErrorCategory::Permanent,
                    "provider down",
                    &self.name,
                )
                .into());
            }
            Ok(self.hits.clone())
        }

        fn name(&self) -> &str {
            &self.name
        }
    }

    fn hit(url: &str, score: f64) -> ProviderSearchHit {
        ProviderSearchHit {
            url: url.into(),
            title: "t".into(),
            snippet: "s".into(),
            score,
        }
    }

    fn subtopic_with_queries() -> Subtopic {
        let mut subtopic = Subtopic::new("s1", "vector indexes");
        subtopic.search_queries = vec![
            "vector indexes".into(),
            "approximate nearest neighbor structures".into(),
            "hnsw index internals".into(),
        ];
        subtopic
    }

    fn service(providers: Vec<Arc<dyn SearchProvider>>) -> SearchService {
        let router = Arc::new(ModelRouterBuilder::new().build());
        SearchService::new(
            providers,
            router,
            SearchConfig {
                inter_call_delay: Duration::from_millis(1),
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_score_filter_and_sort() {
        let provider = StubSearch::with_hits(
            "stub",
            vec![
                hit("https://low.example/", 0.1),
                hit("https://mid.example/", 0.5),
                hit("https://high.example/", 0.9),
            ],
        );
        let service = service(vec![provider as Arc<dyn SearchProvider>]);

        let outcome = service
            .search(
                &subtopic_with_queries(),
                &BTreeSet::new(),
                DegradationTier::Full,
                None,
            )
            .await;

        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.results[0].url, "https://high.example/");
        // Discarded URLs still land in the seen set
        assert!(outcome.seen.contains("https://low.example"));
        assert!(!outcome.exhausted);
    }

    #[tokio::test]
    async fn test_dedup_against_run_seen() {
        let provider = StubSearch::with_hits(
            "stub",
            vec![hit("https://example.com/x", 0.9), hit("https://new.example/", 0.8)],
        );
        let service = service(vec![provider as Arc<dyn SearchProvider>]);

        let mut seen = BTreeSet::new();
        seen.insert("https://example.com/x".to_string());

        let outcome = service
            .search(
                &subtopic_with_queries(),
                &seen,
                DegradationTier::Full,
                None,
            )
            .await;

        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].url, "https://new.example/");
    }

    #[tokio::test]
    async fn test_batch_dedup_normalizes() {
        // Same page, different tracking params and case, across queries
        let provider = StubSearch::with_hits(
            "stub",
            vec![
                hit("https://Example.com/x?utm_source=a", 0.9),
                hit("https://example.com/x", 0.8),
            ],
        );
        let service = service(vec![provider as Arc<dyn SearchProvider>]);

        let outcome = service
            .search(
                &subtopic_with_queries(),
                &BTreeSet::new(),
                DegradationTier::Full,
                None,
            )
            .await;

        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.seen.len(), 1);
    }

    #[tokio::test]
    async fn test_provider_fallback_chain() {
        let dead: Arc<dyn SearchProvider> = StubSearch::failing("dead");
        let alive: Arc<dyn SearchProvider> =
            StubSearch::with_hits("alive", vec![hit("https://ok.example/", 0.9)]);
        let service = service(vec![dead, alive]);

        let outcome = service
            .search(
                &subtopic_with_queries(),
                &BTreeSet::new(),
                DegradationTier::Full,
                None,
            )
            .await;

        assert_eq!(outcome.results.len(), 1);
        assert!(outcome.errors.is_empty());
    }

    #[tokio::test]
    async fn test_all_providers_fail_marks_exhausted() {
        let service = service(vec![
            StubSearch::failing("a") as Arc<dyn SearchProvider>,
            StubSearch::failing("b") as Arc<dyn SearchProvider>,
        ]);

        let outcome = service
            .search(
                &subtopic_with_queries(),
                &BTreeSet::new(),
                DegradationTier::Full,
                None,
            )
            .await;

        assert!(outcome.exhausted);
        assert!(outcome.results.is_empty());
        // One error per failed query
        assert_eq!(outcome.errors.len(), 3);
        assert!(outcome.errors.iter().all(|e| e.subtopic_id.as_deref() == Some("s1")));
    }

    #[tokio::test]
    async fn test_reduced_tier_uses_fewer_queries() {
        let provider = StubSearch::with_hits("stub", vec![]);
        let counting = Arc::clone(&provider);
        let service = service(vec![provider as Arc<dyn SearchProvider>]);

        service
            .search(
                &subtopic_with_queries(),
                &BTreeSet::new(),
                DegradationTier::Reduced,
                None,
            )
            .await;

        assert_eq!(counting.calls.load(Ordering::SeqCst), 2);
    }
}
