//! Report Assembly
//!
//! Builds the final Markdown report: a global citation index deduplicated
//! across subtopics, the synthesized body sections, a numbered Sources
//! list, and (for PARTIAL runs) an explicit coverage-gaps section. Every
//! inline `[n]` in the emitted body resolves to an index entry; invalid
//! references are stripped and defined-but-unreferenced entries are
//! flagged in the log, not the report.

use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use tracing::warn;

use crate::search::normalize;
use crate::state::{ReportMetadata, SubtopicSummary};

static CITATION_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(\d+)\]").expect("valid regex"));

// =============================================================================
// Citation Index
// =============================================================================

/// Global numbered source index, deduplicated by normalized URL in
/// first-seen order across subtopic summaries.
#[derive(Debug, Clone)]
pub struct CitationIndex {
    /// Original URLs in index order; entry `i` renders as `[i + 1]`
    entries: Vec<String>,
    by_normalized: HashMap<String, usize>,
}

impl CitationIndex {
    pub fn build(summaries: &[SubtopicSummary]) -> Self {
        let mut index = Self {
            entries: Vec::new(),
            by_normalized: HashMap::new(),
        };
        for summary in summaries {
            for url in &summary.citations {
                let key = normalize(url);
                if !index.by_normalized.contains_key(&key) {
                    index.by_normalized.insert(key, index.entries.len());
                    index.entries.push(url.clone());
                }
            }
        }
        index
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 1-based citation number for a URL, if indexed
    pub fn number_for(&self, url: &str) -> Option<usize> {
        self.by_normalized.get(&normalize(url)).map(|i| i + 1)
    }

    pub fn urls(&self) -> &[String] {
        &self.entries
    }

    /// Numbered list handed to the synthesize prompt
    pub fn render_numbered(&self) -> String {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, url)| format!("[{}] {}", i + 1, url))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// =============================================================================
// Synthesized Body
// =============================================================================

/// JSON shape the synthesize model call returns.
#[derive(Debug, Clone, Deserialize)]
pub struct SynthesizedBody {
    pub title: String,
    pub executive_summary: String,
    #[serde(default)]
    pub findings: Vec<SynthesizedFinding>,
    pub conclusions: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SynthesizedFinding {
    #[serde(default)]
    pub subtopic_id: String,
    pub heading: String,
    pub body: String,
}

// =============================================================================
// Validation
// =============================================================================

/// Strip `[n]` references with no index entry and log which defined
/// entries the text never referenced (non-fatal).
pub fn validate_references(text: &str, index: &CitationIndex) -> (String, Vec<usize>) {
    let mut used: BTreeSet<usize> = BTreeSet::new();

    let cleaned = CITATION_REF
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let n: usize = caps[1].parse().unwrap_or(0);
            if n >= 1 && n <= index.len() {
                used.insert(n);
                caps[0].to_string()
            } else {
                warn!(reference = n, "stripping citation with no source entry");
                String::new()
            }
        })
        .into_owned();

    let unreferenced: Vec<usize> = (1..=index.len()).filter(|n| !used.contains(n)).collect();
    if !unreferenced.is_empty() {
        warn!(?unreferenced, "sources defined but never referenced");
    }

    (cleaned, unreferenced)
}

// =============================================================================
// Rendering
// =============================================================================

/// Render the complete report. `skipped` lists subtopic ids left
/// uncovered; when non-empty a Coverage Gaps section is emitted.
pub fn render_report(
    body: &SynthesizedBody,
    index: &CitationIndex,
    skipped: &[String],
) -> (String, ReportMetadata) {
    let mut out = String::new();

    out.push_str(&format!("# {}\n\n", body.title.trim()));

    out.push_str("## Executive Summary\n\n");
    let (summary, _) = validate_references(&body.executive_summary, index);
    out.push_str(summary.trim());
    out.push_str("\n\n");

    out.push_str("## Key Findings\n\n");
    for finding in &body.findings {
        out.push_str(&format!("### {}\n\n", finding.heading.trim()));
        let (text, _) = validate_references(&finding.body, index);
        out.push_str(text.trim());
        out.push_str("\n\n");
    }

    out.push_str("## Conclusions\n\n");
    let (conclusions, _) = validate_references(&body.conclusions, index);
    out.push_str(conclusions.trim());
    out.push_str("\n\n");

    if !skipped.is_empty() {
        out.push_str("## Coverage Gaps\n\n");
        out.push_str(
            "The following subtopics were not fully researched before the run degraded:\n\n",
        );
        for id in skipped {
            out.push_str(&format!("- {}\n", id));
        }
        out.push('\n');
    }

    out.push_str("## Sources\n\n");
    for (i, url) in index.urls().iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, url));
    }

    let metadata = ReportMetadata {
        word_count: out.split_whitespace().count(),
        source_count: index.len(),
        subtopics_covered: body.findings.len(),
        skipped_subtopics: skipped.to_vec(),
        generated_at: chrono::Utc::now(),
        model: String::new(),
    };

    (out, metadata)
}
