//! Stage Functions
//!
//! Plan, Search, Scrape, Summarize, and Synthesize. Each stage receives
//! the current state read-only and returns a [`StateUpdate`]; only the
//! executor applies updates. Search and scrape never fail the run; plan
//! and synthesize are fatal on model-chain exhaustion; summarize records
//! the failure and moves on.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use super::prompts;
use super::report::{CitationIndex, SynthesizedBody, SynthesizedFinding, render_report};
use crate::constants::{plan as plan_constants, report as report_constants};
use crate::llm::{CallIntent, CompletionRequest, ModelRouter, validation};
use crate::persist::ProgressReport;
use crate::scrape::Scraper;
use crate::search::{SearchService, normalize};
use crate::state::{
    DegradationTier, ResearchState, RunError, StateUpdate, SubtopicStatus, Subtopic,
    SubtopicSummary,
};
use crate::types::{FathomError, Result};

/// Stage-level tuning shared across the run.
#[derive(Debug, Clone)]
pub struct StageOptions {
    pub temperature: f32,
    pub report_max_words: usize,
}

impl Default for StageOptions {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            report_max_words: report_constants::MAX_WORDS,
        }
    }
}

/// Everything a stage needs, threaded through the executor (no global
/// mutable state).
pub struct StageServices {
    pub router: Arc<ModelRouter>,
    pub search: Arc<SearchService>,
    pub scraper: Arc<Scraper>,
    pub progress: ProgressReport,
    pub options: StageOptions,
}

/// A stage's result plus router-health signals the degradation
/// controller consumes.
#[derive(Debug, Default)]
pub struct StageOutcome {
    pub update: StateUpdate,
    pub model_succeeded: bool,
    pub model_exhausted: bool,
}

impl StageOutcome {
    fn from_update(update: StateUpdate) -> Self {
        Self {
            update,
            ..Default::default()
        }
    }
}

// =============================================================================
// Plan
// =============================================================================

#[derive(Debug, Deserialize)]
struct PlannedSubtopics {
    subtopics: Vec<PlannedSubtopic>,
}

#[derive(Debug, Deserialize)]
struct PlannedSubtopic {
    #[serde(default)]
    id: String,
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    search_queries: Vec<String>,
}

/// Decompose the query into subtopics. Fatal when the model produces
/// fewer than one parseable subtopic.
pub async fn plan(
    state: &ResearchState,
    services: &StageServices,
    parent_id: Option<u64>,
) -> Result<StageOutcome> {
    let request = CompletionRequest::new(
        prompts::PLAN_SYSTEM,
        &[],
        &prompts::plan_prompt(&state.query),
        CallIntent::Plan,
    )
    .with_temperature(services.options.temperature);

    let reply = services
        .router
        .call(&request, state.degradation_tier, parent_id)
        .await?;

    let parsed: PlannedSubtopics = validation::extract_json(&reply.text)
        .and_then(|value| serde_json::from_value(value).map_err(Into::into))
        .map_err(|err| FathomError::PlanInvalid(format!("unparseable plan: {}", err)))?;

    let subtopics: Vec<Subtopic> = parsed
        .subtopics
        .into_iter()
        .filter(|s| !s.title.trim().is_empty())
        .take(plan_constants::MAX_SUBTOPICS)
        .enumerate()
        .map(|(index, planned)| Subtopic {
            id: if planned.id.trim().is_empty() {
                format!("s{}", index + 1)
            } else {
                planned.id
            },
            title: planned.title,
            description: planned.description,
            search_queries: planned.search_queries,
            status: SubtopicStatus::Pending,
        })
        .collect();

    if subtopics.len() < plan_constants::MIN_SUBTOPICS {
        return Err(FathomError::PlanInvalid(
            "model produced no usable subtopics".to_string(),
        ));
    }

    info!(subtopics = subtopics.len(), "plan complete");

    Ok(StageOutcome {
        update: StateUpdate {
            subtopics: Some(subtopics),
            current_subtopic_index: Some(0),
            ..Default::default()
        },
        model_succeeded: true,
        model_exhausted: false,
    })
}

// =============================================================================
// Search
// =============================================================================

/// Search the current subtopic. Never fails the run; a subtopic whose
/// every query fails is marked failed. No new calls in CACHED/PARTIAL.
pub async fn search(
    state: &ResearchState,
    services: &StageServices,
    parent_id: Option<u64>,
) -> StageOutcome {
    let Some(subtopic) = state.current_subtopic() else {
        return StageOutcome::default();
    };

    if !state.degradation_tier.allows_gathering() {
        info!(tier = %state.degradation_tier, "skipping search in degraded tier");
        return StageOutcome::default();
    }

    let outcome = services
        .search
        .search(subtopic, &state.seen_urls, state.degradation_tier, parent_id)
        .await;

    let status = if outcome.exhausted {
        warn!(subtopic = %subtopic.id, "every search query failed");
        SubtopicStatus::Failed
    } else {
        SubtopicStatus::Searching
    };

    StageOutcome::from_update(StateUpdate {
        search_results: outcome.results,
        seen_urls: outcome.seen,
        errors: outcome.errors,
        subtopic_status: vec![(subtopic.id.clone(), status)],
        ..Default::default()
    })
}

// =============================================================================
// Scrape
// =============================================================================

/// Scrape this subtopic's search results. URL-level failures land in
/// `errors`; the run continues regardless.
pub async fn scrape(state: &ResearchState, services: &StageServices) -> StageOutcome {
    let Some(subtopic) = state.current_subtopic() else {
        return StageOutcome::default();
    };

    if !state.degradation_tier.allows_gathering() {
        info!(tier = %state.degradation_tier, "skipping scrape in degraded tier");
        return StageOutcome::default();
    }
    if subtopic.status == SubtopicStatus::Failed {
        return StageOutcome::default();
    }

    // Pages already scraped in this run (any subtopic) are not refetched
    let already: std::collections::BTreeSet<String> = state
        .scraped_pages
        .iter()
        .map(|p| normalize(&p.url))
        .collect();

    let batch: Vec<_> = state
        .results_for(&subtopic.id)
        .into_iter()
        .filter(|r| !already.contains(&normalize(&r.url)))
        .cloned()
        .collect();

    let outcome = services.scraper.scrape(&batch).await;

    StageOutcome::from_update(StateUpdate {
        scraped_pages: outcome.pages,
        errors: outcome.errors,
        subtopic_status: vec![(subtopic.id.clone(), SubtopicStatus::Scraping)],
        ..Default::default()
    })
}

// =============================================================================
// Summarize
// =============================================================================

#[derive(Debug, Deserialize)]
struct SummaryReply {
    summary: String,
    #[serde(default)]
    citations: Vec<String>,
}

/// Summarize the current subtopic's pages into one `SubtopicSummary`,
/// append it to the progressive report, evict consumed raw content, and
/// advance the subtopic index. Model failure is recorded, not fatal.
pub async fn summarize(
    state: &ResearchState,
    services: &StageServices,
    parent_id: Option<u64>,
) -> StageOutcome {
    let next_index = state.current_subtopic_index + 1;
    let Some(subtopic) = state.current_subtopic() else {
        return StageOutcome::default();
    };

    let pages = state.pages_for(&subtopic.id);
    let usable: Vec<_> = pages
        .iter()
        .filter(|p| p.content.as_deref().is_some_and(|c| !c.is_empty()))
        .copied()
        .collect();

    if usable.is_empty() {
        warn!(subtopic = %subtopic.id, "no usable pages to summarize");
        return StageOutcome::from_update(StateUpdate {
            errors: vec![
                RunError::new("summarize", "no usable pages for subtopic")
                    .subtopic(&subtopic.id),
            ],
            subtopic_status: vec![(subtopic.id.clone(), SubtopicStatus::Failed)],
            current_subtopic_index: Some(next_index),
            ..Default::default()
        });
    }

    let target_words = match state.degradation_tier {
        DegradationTier::Full => report_constants::SUMMARY_WORDS_FULL,
        _ => report_constants::SUMMARY_WORDS_REDUCED,
    };

    let request = CompletionRequest::new(
        prompts::SUMMARIZE_SYSTEM,
        &[],
        &prompts::summarize_prompt(&subtopic.title, &usable, target_words),
        CallIntent::Summarize,
    )
    .with_temperature(services.options.temperature);

    let reply = match services
        .router
        .call(&request, state.degradation_tier, parent_id)
        .await
    {
        Ok(reply) => reply,
        Err(err) => {
            warn!(subtopic = %subtopic.id, error = %err, "summarize model call failed");
            return StageOutcome {
                update: StateUpdate {
                    errors: vec![
                        RunError::new("summarize", err.to_string()).subtopic(&subtopic.id),
                    ],
                    subtopic_status: vec![(subtopic.id.clone(), SubtopicStatus::Failed)],
                    current_subtopic_index: Some(next_index),
                    ..Default::default()
                },
                model_succeeded: false,
                model_exhausted: matches!(err, FathomError::ModelCallExhausted { .. }),
            };
        }
    };

    let page_urls: Vec<String> = usable.iter().map(|p| p.url.clone()).collect();
    let (summary_text, citations) = match validation::extract_json(&reply.text)
        .and_then(|v| serde_json::from_value::<SummaryReply>(v).map_err(Into::into))
    {
        Ok(parsed) => {
            // Citations must point at pages this subtopic actually
            // consumed, once each, in the order the model emitted them
            let normalized_pages: std::collections::BTreeSet<String> =
                page_urls.iter().map(|u| normalize(u)).collect();
            let mut cited: std::collections::BTreeSet<String> = std::collections::BTreeSet::new();
            let mut kept: Vec<String> = parsed
                .citations
                .into_iter()
                .filter(|c| {
                    let key = normalize(c);
                    normalized_pages.contains(&key) && cited.insert(key)
                })
                .collect();
            if kept.is_empty() {
                kept = page_urls.clone();
            }
            (parsed.summary, kept)
        }
        Err(_) => {
            // Unstructured reply: keep the prose, cite everything consumed
            (reply.text.clone(), page_urls.clone())
        }
    };

    let summary = SubtopicSummary {
        subtopic_id: subtopic.id.clone(),
        title: subtopic.title.clone(),
        summary: summary_text,
        citations,
        token_count: reply.usage.output_tokens,
    };

    if let Err(err) = services.progress.append_summary(&summary) {
        warn!(error = %err, "failed to append progressive report section");
    }

    info!(subtopic = %subtopic.id, citations = summary.citations.len(), "subtopic summarized");

    StageOutcome {
        update: StateUpdate {
            subtopic_summaries: vec![summary],
            subtopic_status: vec![(subtopic.id.clone(), SubtopicStatus::Done)],
            current_subtopic_index: Some(next_index),
            evict_content_for: Some(subtopic.id.clone()),
            ..Default::default()
        },
        model_succeeded: true,
        model_exhausted: false,
    }
}

// =============================================================================
// Synthesize
// =============================================================================

/// One-shot synthesis of every subtopic summary into the final report.
/// Fatal on model-chain exhaustion, except that a run with no summaries
/// at all still produces a minimal report.
pub async fn synthesize(
    state: &ResearchState,
    services: &StageServices,
    parent_id: Option<u64>,
) -> Result<StageOutcome> {
    let skipped: Vec<String> = if state.degradation_tier == DegradationTier::Partial {
        state.uncovered_subtopics()
    } else {
        Vec::new()
    };

    if state.subtopic_summaries.is_empty() {
        warn!("synthesizing with no summaries, emitting minimal report");
        let body = SynthesizedBody {
            title: state.query.clone(),
            executive_summary: "No research could be completed for this query.".to_string(),
            findings: Vec::new(),
            conclusions: String::new(),
        };
        let all_ids: Vec<String> = state.subtopics.iter().map(|s| s.id.clone()).collect();
        let gap_ids = if skipped.is_empty() { all_ids } else { skipped };
        let (markdown, metadata) = render_report(&body, &CitationIndex::build(&[]), &gap_ids);
        return Ok(StageOutcome::from_update(StateUpdate {
            final_report: Some(markdown),
            report_metadata: Some(metadata),
            ..Default::default()
        }));
    }

    let index = CitationIndex::build(&state.subtopic_summaries);
    let request = CompletionRequest::new(
        prompts::SYNTHESIZE_SYSTEM,
        &[],
        &prompts::synthesize_prompt(
            &state.query,
            &state.subtopic_summaries,
            &index.render_numbered(),
            services.options.report_max_words,
        ),
        CallIntent::Synthesize,
    )
    .with_temperature(services.options.temperature)
    .with_max_tokens(8192);

    let reply = services
        .router
        .call(&request, state.degradation_tier, parent_id)
        .await?;

    let body = match validation::extract_json(&reply.text)
        .and_then(|v| serde_json::from_value::<SynthesizedBody>(v).map_err(Into::into))
    {
        Ok(body) => body,
        Err(err) => {
            // Deterministic fallback assembled straight from summaries
            warn!(error = %err, "synthesize reply unparseable, assembling report from summaries");
            SynthesizedBody {
                title: state.query.clone(),
                executive_summary: reply.text.clone(),
                findings: state
                    .subtopic_summaries
                    .iter()
                    .map(|s| SynthesizedFinding {
                        subtopic_id: s.subtopic_id.clone(),
                        heading: s.title.clone(),
                        body: s.summary.clone(),
                    })
                    .collect(),
                conclusions: String::new(),
            }
        }
    };

    let (markdown, mut metadata) = render_report(&body, &index, &skipped);
    metadata.model = reply.model.clone();

    info!(
        words = metadata.word_count,
        sources = metadata.source_count,
        "report synthesized"
    );

    Ok(StageOutcome {
        update: StateUpdate {
            final_report: Some(markdown),
            report_metadata: Some(metadata),
            ..Default::default()
        },
        model_succeeded: true,
        model_exhausted: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmProvider, ModelReply, ModelRouterBuilder, TokenUsage};
    use crate::scrape::{Extraction, Extractor, ScrapeConfig};
    use crate::search::{ProviderSearchHit, SearchConfig, SearchDepth, SearchProvider};
    use crate::types::RunId;
    use async_trait::async_trait;
    use std::time::Duration;

    /// Stub LLM that answers per intent with canned JSON.
    struct ScriptedLlm;

    #[async_trait]
    impl LlmProvider for ScriptedLlm {
        async fn complete(&self, request: &CompletionRequest) -> Result<ModelReply> {
            let text = match request.intent {
                CallIntent::Plan => serde_json::json!({
                    "subtopics": [
                        {"id": "s1", "title": "Fundamentals", "description": "d",
                         "search_queries": ["q1", "q2", "q3"]},
                        {"id": "s2", "title": "Indexing", "description": "d",
                         "search_queries": ["q1", "q2", "q3"]},
                        {"id": "s3", "title": "Use cases", "description": "d",
                         "search_queries": ["q1", "q2", "q3"]},
                    ]
                })
                .to_string(),
                CallIntent::Summarize => serde_json::json!({
                    "summary": "A two-hundred word summary of the findings.",
                    "citations": ["https://pages.example/one"]
                })
                .to_string(),
                CallIntent::Synthesize => serde_json::json!({
                    "title": "Vector Databases",
                    "executive_summary": "Overview [1].",
                    "findings": [
                        {"subtopic_id": "s1", "heading": "Fundamentals", "body": "Body [1]."}
                    ],
                    "conclusions": "Conclusions [1]."
                })
                .to_string(),
                CallIntent::Judge => "[\"a\", \"b\", \"c\"]".to_string(),
            };

            Ok(ModelReply {
                text,
                usage: TokenUsage {
                    input_tokens: 500,
                    output_tokens: 200,
                    cached_tokens: 0,
                },
                provider: "scripted".into(),
                model: "scripted-model".into(),
                cost_usd: 0.01,
                latency_ms: 1,
            })
        }

        fn name(&self) -> &str {
            "scripted"
        }

        fn model(&self) -> &str {
            "scripted-model"
        }
    }

    struct StubSearchProvider;

    #[async_trait]
    impl SearchProvider for StubSearchProvider {
        async fn search(
            &self,
            _query: &str,
            _max_results: usize,
            _depth: SearchDepth,
        ) -> Result<Vec<ProviderSearchHit>> {
            Ok(vec![ProviderSearchHit {
                url: "https://pages.example/one".into(),
                title: "One".into(),
                snippet: "snippet".into(),
                score: 0.9,
            }])
        }

        fn name(&self) -> &str {
            "stub-search"
        }
    }

    struct StubExtractor;

    #[async_trait]
    impl Extractor for StubExtractor {
        async fn extract(&self, _url: &str, _timeout: Duration) -> Result<Extraction> {
            let sentence = "Substantive prose with enough words to pass the scoring floor easily. ";
            Ok(Extraction {
                content: sentence.repeat(40),
                mime: "text/html".into(),
                fetched_at: chrono::Utc::now(),
                publish_date: None,
            })
        }

        fn name(&self) -> &str {
            "stub-extract"
        }
    }

    fn services(progress_dir: &std::path::Path) -> StageServices {
        services_with(Arc::new(ScriptedLlm), progress_dir)
    }

    fn services_with(
        llm: Arc<dyn LlmProvider + Send + Sync>,
        progress_dir: &std::path::Path,
    ) -> StageServices {
        let router = Arc::new(ModelRouterBuilder::new().primary(llm).build());
        let search = Arc::new(SearchService::new(
            vec![Arc::new(StubSearchProvider) as Arc<dyn SearchProvider>],
            Arc::clone(&router),
            SearchConfig {
                inter_call_delay: Duration::from_millis(1),
                ..Default::default()
            },
        ));
        let scraper = Arc::new(Scraper::new(
            Arc::new(StubExtractor),
            None,
            ScrapeConfig::default(),
        ));
        StageServices {
            router,
            search,
            scraper,
            progress: ProgressReport::new(&progress_dir.join("progress.md")),
            options: StageOptions::default(),
        }
    }

    fn fresh_state() -> ResearchState {
        ResearchState::new(RunId::new("stage-test"), "What is a vector database?")
    }

    #[tokio::test]
    async fn test_plan_produces_subtopics() {
        let tmp = tempfile::TempDir::new().unwrap();
        let services = services(tmp.path());
        let state = fresh_state();

        let outcome = plan(&state, &services, None).await.unwrap();
        let subtopics = outcome.update.subtopics.as_ref().unwrap();
        assert_eq!(subtopics.len(), 3);
        assert_eq!(subtopics[0].id, "s1");
        assert_eq!(outcome.update.current_subtopic_index, Some(0));
        assert!(outcome.model_succeeded);
    }

    #[tokio::test]
    async fn test_full_subtopic_cycle() {
        let tmp = tempfile::TempDir::new().unwrap();
        let services = services(tmp.path());
        let mut state = fresh_state();

        let planned = plan(&state, &services, None).await.unwrap();
        crate::state::reducer::apply(&mut state, planned.update);

        let searched = search(&state, &services, None).await;
        crate::state::reducer::apply(&mut state, searched.update);
        assert_eq!(state.search_results.len(), 1);
        assert!(state.seen_urls.contains("https://pages.example/one"));

        let scraped = scrape(&state, &services).await;
        crate::state::reducer::apply(&mut state, scraped.update);
        assert_eq!(state.scraped_pages.len(), 1);

        let summarized = summarize(&state, &services, None).await;
        crate::state::reducer::apply(&mut state, summarized.update);
        assert_eq!(state.subtopic_summaries.len(), 1);
        assert_eq!(state.current_subtopic_index, 1);
        // Observation masking: raw content evicted after summarize
        assert!(state.scraped_pages[0].content.is_none());
        // Progressive report grew
        let progress = std::fs::read_to_string(tmp.path().join("progress.md")).unwrap();
        assert!(progress.contains("## Fundamentals"));
    }

    #[tokio::test]
    async fn test_summarize_dedups_repeated_citations() {
        /// Cites the first page twice, non-adjacently
        struct DoubleCitingLlm;

        #[async_trait]
        impl LlmProvider for DoubleCitingLlm {
            async fn complete(&self, _request: &CompletionRequest) -> Result<ModelReply> {
                Ok(ModelReply {
                    text: serde_json::json!({
                        "summary": "Findings drawn from both pages.",
                        "citations": [
                            "https://pages.example/one",
                            "https://pages.example/two",
                            "https://pages.example/one?utm_source=model"
                        ]
                    })
                    .to_string(),
                    usage: TokenUsage::default(),
                    provider: "double".into(),
                    model: "double-model".into(),
                    cost_usd: 0.01,
                    latency_ms: 1,
                })
            }

            fn name(&self) -> &str {
                "double"
            }

            fn model(&self) -> &str {
                "double-model"
            }
        }

        let tmp = tempfile::TempDir::new().unwrap();
        let services = services_with(Arc::new(DoubleCitingLlm), tmp.path());
        let mut state = fresh_state();
        state.subtopics = vec![Subtopic::new("s1", "Fundamentals")];
        for url in ["https://pages.example/one", "https://pages.example/two"] {
            state.scraped_pages.push(crate::state::ScrapedPage {
                url: url.into(),
                content: Some("page text".into()),
                quality_score: 0.8,
                word_count: 2,
                subtopic_id: "s1".into(),
                flagged: false,
            });
        }

        let outcome = summarize(&state, &services, None).await;
        crate::state::reducer::apply(&mut state, outcome.update);

        // One entry per page, first-seen order, despite the repeat
        assert_eq!(
            state.subtopic_summaries[0].citations,
            vec![
                "https://pages.example/one".to_string(),
                "https://pages.example/two".to_string()
            ]
        );

        // The progressive report's bullet list carries no duplicate
        let progress = std::fs::read_to_string(tmp.path().join("progress.md")).unwrap();
        assert_eq!(progress.matches("- https://pages.example/one").count(), 1);
    }

    #[tokio::test]
    async fn test_summarize_without_pages_marks_failed() {
        let tmp = tempfile::TempDir::new().unwrap();
        let services = services(tmp.path());
        let mut state = fresh_state();
        state.subtopics = vec![Subtopic::new("s1", "Empty one")];

        let outcome = summarize(&state, &services, None).await;
        crate::state::reducer::apply(&mut state, outcome.update);

        assert!(state.subtopic_summaries.is_empty());
        assert_eq!(state.subtopics[0].status, SubtopicStatus::Failed);
        assert_eq!(state.current_subtopic_index, 1);
        assert_eq!(state.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_search_skipped_in_cached_tier() {
        let tmp = tempfile::TempDir::new().unwrap();
        let services = services(tmp.path());
        let mut state = fresh_state();
        state.subtopics = vec![Subtopic::new("s1", "One")];
        state.degradation_tier = DegradationTier::Cached;

        let outcome = search(&state, &services, None).await;
        assert!(outcome.update.is_empty());

        let outcome = scrape(&state, &services).await;
        assert!(outcome.update.is_empty());
    }

    #[tokio::test]
    async fn test_synthesize_renders_full_report() {
        let tmp = tempfile::TempDir::new().unwrap();
        let services = services(tmp.path());
        let mut state = fresh_state();
        state.subtopic_summaries = vec![SubtopicSummary {
            subtopic_id: "s1".into(),
            title: "Fundamentals".into(),
            summary: "Summary text.".into(),
            citations: vec!["https://pages.example/one".into()],
            token_count: 100,
        }];

        let outcome = synthesize(&state, &services, None).await.unwrap();
        let report = outcome.update.final_report.unwrap();

        assert!(report.contains("## Executive Summary"));
        assert!(report.contains("## Key Findings"));
        assert!(report.contains("## Sources"));
        assert!(report.contains("1. https://pages.example/one"));

        let metadata = outcome.update.report_metadata.unwrap();
        assert_eq!(metadata.source_count, 1);
        assert_eq!(metadata.model, "scripted-model");
    }

    #[tokio::test]
    async fn test_synthesize_partial_lists_gaps() {
        let tmp = tempfile::TempDir::new().unwrap();
        let services = services(tmp.path());
        let mut state = fresh_state();
        state.subtopics = vec![
            Subtopic::new("s1", "Covered"),
            Subtopic::new("s2", "Skipped"),
            Subtopic::new("s3", "Also skipped"),
        ];
        state.subtopic_summaries = vec![SubtopicSummary {
            subtopic_id: "s1".into(),
            title: "Covered".into(),
            summary: "Summary.".into(),
            citations: vec!["https://pages.example/one".into()],
            token_count: 10,
        }];
        state.degradation_tier = DegradationTier::Partial;

        let outcome = synthesize(&state, &services, None).await.unwrap();
        let report = outcome.update.final_report.unwrap();

        assert!(report.contains("## Coverage Gaps"));
        assert!(report.contains("- s2"));
        assert!(report.contains("- s3"));
    }

    #[tokio::test]
    async fn test_synthesize_with_nothing_produces_minimal_report() {
        let tmp = tempfile::TempDir::new().unwrap();
        let services = services(tmp.path());
        let mut state = fresh_state();
        state.subtopics = vec![Subtopic::new("s1", "One")];

        let outcome = synthesize(&state, &services, None).await.unwrap();
        let report = outcome.update.final_report.unwrap();
        assert!(report.contains("No research could be completed"));
        assert!(report.contains("- s1"));
    }
}
