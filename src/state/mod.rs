//! Research State
//!
//! The single unit of work for a run: a typed record with accumulator
//! fields updated only through reducers ([`reducer::StateUpdate`]) and
//! persisted after every stage. Serialization keeps stable key order and
//! serializes `seen_urls` as a sorted array; deserialization tolerates
//! unknown fields for forward compatibility.

pub mod migration;
pub mod reducer;

pub use reducer::StateUpdate;

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::checkpoint::SCHEMA_VERSION;
use crate::types::RunId;

// =============================================================================
// Subtopics
// =============================================================================

/// Lifecycle of a subtopic; advances monotonically except on explicit
/// retry from a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubtopicStatus {
    #[default]
    Pending,
    Searching,
    Scraping,
    Summarizing,
    Done,
    Failed,
}

impl std::fmt::Display for SubtopicStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Searching => write!(f, "searching"),
            Self::Scraping => write!(f, "scraping"),
            Self::Summarizing => write!(f, "summarizing"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A scoped sub-question produced by the plan stage; the unit of fan-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subtopic {
    /// Stable id, unique within the run
    pub id: String,
    pub title: String,
    pub description: String,
    /// Ordered search queries (direct, broader, narrower)
    pub search_queries: Vec<String>,
    #[serde(default)]
    pub status: SubtopicStatus,
}

impl Subtopic {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            search_queries: Vec::new(),
            status: SubtopicStatus::Pending,
        }
    }
}

// =============================================================================
// Gathered Artifacts
// =============================================================================

/// One web search hit, already score-filtered and deduplicated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub url: String,
    pub title: String,
    pub snippet: String,
    /// Relevance score in [0,1]
    pub score: f64,
    pub subtopic_id: String,
}

/// Extracted page content with its quality assessment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapedPage {
    pub url: String,
    /// Raw extracted text; `None` after observation masking
    pub content: Option<String>,
    /// Quality score in [0,1]
    pub quality_score: f64,
    pub word_count: usize,
    pub subtopic_id: String,
    /// Set when quality falls in the flagged band (reject..accept)
    #[serde(default)]
    pub flagged: bool,
}

/// Dense per-subtopic summary with its source citations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtopicSummary {
    pub subtopic_id: String,
    pub title: String,
    pub summary: String,
    /// Ordered, deduplicated source URLs backing the summary
    pub citations: Vec<String>,
    pub token_count: u64,
}

/// A recorded non-fatal failure (search, scrape, or summarize).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunError {
    pub stage: String,
    pub subtopic_id: Option<String>,
    pub url: Option<String>,
    pub message: String,
    pub ts: DateTime<Utc>,
}

impl RunError {
    pub fn new(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            subtopic_id: None,
            url: None,
            message: message.into(),
            ts: Utc::now(),
        }
    }

    pub fn subtopic(mut self, id: impl Into<String>) -> Self {
        self.subtopic_id = Some(id.into());
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

// =============================================================================
// Degradation Tier
// =============================================================================

/// Coarse-grained operating mode driving which providers and how much
/// work is attempted. Ordered from healthiest to most degraded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DegradationTier {
    #[default]
    Full,
    Reduced,
    Cached,
    Partial,
}

impl DegradationTier {
    /// One step toward more degraded operation
    pub fn down(self) -> Self {
        match self {
            Self::Full => Self::Reduced,
            Self::Reduced => Self::Cached,
            Self::Cached | Self::Partial => Self::Partial,
        }
    }

    /// One step toward recovery
    pub fn up(self) -> Self {
        match self {
            Self::Full | Self::Reduced => Self::Full,
            Self::Cached => Self::Reduced,
            Self::Partial => Self::Cached,
        }
    }

    /// Whether new search/scrape calls are allowed in this tier
    pub fn allows_gathering(self) -> bool {
        matches!(self, Self::Full | Self::Reduced)
    }
}

impl std::fmt::Display for DegradationTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "FULL"),
            Self::Reduced => write!(f, "REDUCED"),
            Self::Cached => write!(f, "CACHED"),
            Self::Partial => write!(f, "PARTIAL"),
        }
    }
}

// =============================================================================
// Report Metadata
// =============================================================================

/// Metadata produced alongside the final report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub word_count: usize,
    pub source_count: usize,
    pub subtopics_covered: usize,
    /// Subtopic ids skipped by PARTIAL degradation or failure
    pub skipped_subtopics: Vec<String>,
    pub generated_at: DateTime<Utc>,
    pub model: String,
}

// =============================================================================
// Research State
// =============================================================================

/// Full state of one research run. The executor is the sole mutator;
/// stages return [`StateUpdate`]s that the reducer applies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchState {
    /// Always set; loaders migrate lower versions forward
    #[serde(rename = "_schema_version")]
    pub schema_version: u32,
    pub run_id: RunId,
    pub query: String,

    // Scalar fields (overwritten by updates)
    #[serde(default)]
    pub subtopics: Vec<Subtopic>,
    #[serde(default)]
    pub current_subtopic_index: usize,
    #[serde(default)]
    pub final_report: Option<String>,
    #[serde(default)]
    pub report_metadata: Option<ReportMetadata>,
    #[serde(default)]
    pub total_cost: f64,
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(default)]
    pub degradation_tier: DegradationTier,

    // Append-reducer fields
    #[serde(default)]
    pub search_results: Vec<SearchResult>,
    #[serde(default)]
    pub scraped_pages: Vec<ScrapedPage>,
    #[serde(default)]
    pub subtopic_summaries: Vec<SubtopicSummary>,
    #[serde(default)]
    pub errors: Vec<RunError>,

    // Set-valued (union reducer); BTreeSet serializes sorted
    #[serde(default)]
    pub seen_urls: BTreeSet<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ResearchState {
    /// Create a fresh state for a new run
    pub fn new(run_id: RunId, query: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            schema_version: SCHEMA_VERSION,
            run_id,
            query: query.into(),
            subtopics: Vec::new(),
            current_subtopic_index: 0,
            final_report: None,
            report_metadata: None,
            total_cost: 0.0,
            total_tokens: 0,
            degradation_tier: DegradationTier::Full,
            search_results: Vec::new(),
            scraped_pages: Vec::new(),
            subtopic_summaries: Vec::new(),
            errors: Vec::new(),
            seen_urls: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Subtopic currently being processed, if any
    pub fn current_subtopic(&self) -> Option<&Subtopic> {
        self.subtopics.get(self.current_subtopic_index)
    }

    /// Whether more subtopics remain after the current index
    pub fn has_remaining_subtopics(&self) -> bool {
        self.current_subtopic_index < self.subtopics.len()
    }

    /// Search results belonging to one subtopic, score-descending
    pub fn results_for(&self, subtopic_id: &str) -> Vec<&SearchResult> {
        let mut results: Vec<&SearchResult> = self
            .search_results
            .iter()
            .filter(|r| r.subtopic_id == subtopic_id)
            .collect();
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results
    }

    /// Scraped pages for one subtopic in deterministic downstream order:
    /// `(subtopic_id, -quality_score, url)`
    pub fn pages_for(&self, subtopic_id: &str) -> Vec<&ScrapedPage> {
        let mut pages: Vec<&ScrapedPage> = self
            .scraped_pages
            .iter()
            .filter(|p| p.subtopic_id == subtopic_id)
            .collect();
        pages.sort_by(|a, b| {
            b.quality_score
                .partial_cmp(&a.quality_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.url.cmp(&b.url))
        });
        pages
    }

    /// Subtopic ids that never produced a summary
    pub fn uncovered_subtopics(&self) -> Vec<String> {
        self.subtopics
            .iter()
            .filter(|s| {
                !self
                    .subtopic_summaries
                    .iter()
                    .any(|sum| sum.subtopic_id == s.id)
            })
            .map(|s| s.id.clone())
            .collect()
    }

    /// Structural invariants checked after every reducer application
    pub fn check_invariants(&self) -> crate::types::Result<()> {
        if self.current_subtopic_index > self.subtopics.len() {
            return Err(crate::types::FathomError::Report(format!(
                "subtopic index {} out of range (len {})",
                self.current_subtopic_index,
                self.subtopics.len()
            )));
        }
        if self.subtopic_summaries.len() > self.subtopics.len() {
            return Err(crate::types::FathomError::Report(format!(
                "{} summaries for {} subtopics",
                self.subtopic_summaries.len(),
                self.subtopics.len()
            )));
        }
        Ok(())
    }
}
