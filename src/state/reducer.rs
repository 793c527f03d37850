//! State Reducers
//!
//! Stages never mutate [`ResearchState`] directly; they return a
//! [`StateUpdate`] and the executor applies it here. Three reducer
//! semantics cover every field:
//!
//! - append-list: `new = old + delta` (order preserved)
//! - set-union:   `new = old ∪ delta`
//! - overwrite:   `new = delta` when the delta is present
//!
//! Applying an empty update is a no-op apart from the `updated_at`
//! timestamp.

use std::collections::BTreeSet;

use chrono::Utc;

use super::{
    DegradationTier, ReportMetadata, ResearchState, RunError, ScrapedPage, SearchResult,
    SubtopicStatus, SubtopicSummary, Subtopic,
};

/// Partial update returned by a stage function.
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    // Append-list fields
    pub search_results: Vec<SearchResult>,
    pub scraped_pages: Vec<ScrapedPage>,
    pub subtopic_summaries: Vec<SubtopicSummary>,
    pub errors: Vec<RunError>,

    // Set-union field
    pub seen_urls: BTreeSet<String>,

    // Scalar overwrites (absent = unchanged)
    pub subtopics: Option<Vec<Subtopic>>,
    pub current_subtopic_index: Option<usize>,
    pub final_report: Option<String>,
    pub report_metadata: Option<ReportMetadata>,
    pub degradation_tier: Option<DegradationTier>,

    /// Monotonic accounting deltas (never negative)
    pub cost_spent: f64,
    pub tokens_spent: u64,

    /// Status transitions for existing subtopics, keyed by id
    pub subtopic_status: Vec<(String, SubtopicStatus)>,

    /// Observation masking: drop raw page content for this subtopic
    pub evict_content_for: Option<String>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when applying this update would change nothing
    pub fn is_empty(&self) -> bool {
        self.search_results.is_empty()
            && self.scraped_pages.is_empty()
            && self.subtopic_summaries.is_empty()
            && self.errors.is_empty()
            && self.seen_urls.is_empty()
            && self.subtopics.is_none()
            && self.current_subtopic_index.is_none()
            && self.final_report.is_none()
            && self.report_metadata.is_none()
            && self.degradation_tier.is_none()
            && self.cost_spent == 0.0
            && self.tokens_spent == 0
            && self.subtopic_status.is_empty()
            && self.evict_content_for.is_none()
    }

    pub fn with_error(mut self, error: RunError) -> Self {
        self.errors.push(error);
        self
    }

    pub fn with_status(mut self, subtopic_id: impl Into<String>, status: SubtopicStatus) -> Self {
        self.subtopic_status.push((subtopic_id.into(), status));
        self
    }
}

/// Apply a partial update to the state, consuming the update.
///
/// The only mutation path for `ResearchState`.
pub fn apply(state: &mut ResearchState, update: StateUpdate) {
    if update.is_empty() {
        return;
    }

    // Append-list reducers
    state.search_results.extend(update.search_results);
    state.scraped_pages.extend(update.scraped_pages);
    state.subtopic_summaries.extend(update.subtopic_summaries);
    state.errors.extend(update.errors);

    // Set-union reducer
    state.seen_urls.extend(update.seen_urls);

    // Scalar overwrites
    if let Some(subtopics) = update.subtopics {
        state.subtopics = subtopics;
    }
    if let Some(index) = update.current_subtopic_index {
        state.current_subtopic_index = index;
    }
    if let Some(report) = update.final_report {
        state.final_report = Some(report);
    }
    if let Some(metadata) = update.report_metadata {
        state.report_metadata = Some(metadata);
    }
    if let Some(tier) = update.degradation_tier {
        state.degradation_tier = tier;
    }

    // Monotonic accounting
    state.total_cost += update.cost_spent.max(0.0);
    state.total_tokens += update.tokens_spent;

    // Subtopic status transitions
    for (id, status) in update.subtopic_status {
        if let Some(subtopic) = state.subtopics.iter_mut().find(|s| s.id == id) {
            subtopic.status = status;
        }
    }

    // Observation masking
    if let Some(subtopic_id) = update.evict_content_for {
        for page in state
            .scraped_pages
            .iter_mut()
            .filter(|p| p.subtopic_id == subtopic_id)
        {
            page.content = None;
        }
    }

    state.updated_at = Utc::now();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RunId;
    use proptest::prelude::*;

    fn sample_state() -> ResearchState {
        let mut state = ResearchState::new(RunId::new("r1"), "q");
        state.subtopics = vec![Subtopic::new("s1", "One"), Subtopic::new("s2", "Two")];
        state
    }

    fn sample_result(url: &str, subtopic: &str, score: f64) -> SearchResult {
        SearchResult {
            url: url.into(),
            title: "t".into(),
            snippet: "s".into(),
            score,
            subtopic_id: subtopic.into(),
        }
    }

    #[test]
    fn test_empty_update_is_noop() {
        let mut state = sample_state();
        let before = serde_json::to_value(&state).unwrap();

        apply(&mut state, StateUpdate::new());

        let after = serde_json::to_value(&state).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_append_preserves_order() {
        let mut state = sample_state();

        apply(
            &mut state,
            StateUpdate {
                search_results: vec![sample_result("https://a/", "s1", 0.9)],
                ..Default::default()
            },
        );
        apply(
            &mut state,
            StateUpdate {
                search_results: vec![sample_result("https://b/", "s1", 0.5)],
                ..Default::default()
            },
        );

        assert_eq!(state.search_results.len(), 2);
        assert_eq!(state.search_results[0].url, "https://a/");
        assert_eq!(state.search_results[1].url, "https://b/");
    }

    #[test]
    fn test_seen_urls_union() {
        let mut state = sample_state();
        state.seen_urls.insert("https://a/".into());

        let mut delta = BTreeSet::new();
        delta.insert("https://a/".into());
        delta.insert("https://b/".into());

        apply(
            &mut state,
            StateUpdate {
                seen_urls: delta,
                ..Default::default()
            },
        );

        assert_eq!(state.seen_urls.len(), 2);
    }

    #[test]
    fn test_scalar_overwrite_only_when_present() {
        let mut state = sample_state();
        state.current_subtopic_index = 1;

        apply(&mut state, StateUpdate::new());
        assert_eq!(state.current_subtopic_index, 1);

        apply(
            &mut state,
            StateUpdate {
                current_subtopic_index: Some(2),
                ..Default::default()
            },
        );
        assert_eq!(state.current_subtopic_index, 2);
    }

    #[test]
    fn test_status_transition() {
        let mut state = sample_state();

        apply(
            &mut state,
            StateUpdate::new().with_status("s1", SubtopicStatus::Searching),
        );

        assert_eq!(state.subtopics[0].status, SubtopicStatus::Searching);
        assert_eq!(state.subtopics[1].status, SubtopicStatus::Pending);
    }

    #[test]
    fn test_observation_masking() {
        let mut state = sample_state();
        state.scraped_pages = vec![
            ScrapedPage {
                url: "https://a/".into(),
                content: Some("long text".into()),
                quality_score: 0.8,
                word_count: 2,
                subtopic_id: "s1".into(),
                flagged: false,
            },
            ScrapedPage {
                url: "https://b/".into(),
                content: Some("other".into()),
                quality_score: 0.8,
                word_count: 1,
                subtopic_id: "s2".into(),
                flagged: false,
            },
        ];

        apply(
            &mut state,
            StateUpdate {
                evict_content_for: Some("s1".into()),
                ..Default::default()
            },
        );

        assert!(state.scraped_pages[0].content.is_none());
        assert_eq!(state.scraped_pages[0].word_count, 2);
        assert!(state.scraped_pages[1].content.is_some());
    }

    #[test]
    fn test_cost_monotonic() {
        let mut state = sample_state();

        apply(
            &mut state,
            StateUpdate {
                cost_spent: 0.05,
                tokens_spent: 1000,
                ..Default::default()
            },
        );
        assert!((state.total_cost - 0.05).abs() < 1e-9);
        assert_eq!(state.total_tokens, 1000);

        // A negative delta must not decrease the total
        apply(
            &mut state,
            StateUpdate {
                cost_spent: -1.0,
                ..Default::default()
            },
        );
        assert!((state.total_cost - 0.05).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn prop_cost_never_decreases(deltas in proptest::collection::vec(0.0f64..0.5, 0..20)) {
            let mut state = sample_state();
            let mut last = 0.0f64;
            for delta in deltas {
                apply(&mut state, StateUpdate { cost_spent: delta, ..Default::default() });
                prop_assert!(state.total_cost >= last);
                last = state.total_cost;
            }
        }

        #[test]
        fn prop_empty_update_noop(urls in proptest::collection::btree_set("[a-z]{1,8}", 0..10)) {
            let mut state = sample_state();
            state.seen_urls = urls;
            let before = serde_json::to_value(&state).unwrap();
            apply(&mut state, StateUpdate::new());
            prop_assert_eq!(before, serde_json::to_value(&state).unwrap());
        }
    }
}
