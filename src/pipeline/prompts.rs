//! Stage Prompts
//!
//! Deterministic prompt builders for the plan, summarize, and synthesize
//! stages. System prompts are static strings so vendor prompt caching
//! stays effective; only the user message varies per call.

use crate::state::{ScrapedPage, SubtopicSummary};

pub const PLAN_SYSTEM: &str = "You are a research planner. You decompose a research query into \
     focused subtopics and respond with valid JSON only.";

pub const SUMMARIZE_SYSTEM: &str = "You are a research analyst. You write dense, factual summaries \
     grounded in the provided sources and respond with valid JSON only.";

pub const SYNTHESIZE_SYSTEM: &str = "You are a research writer. You synthesize subtopic summaries into \
     a coherent cited report and respond with valid JSON only.";

/// Plan: query → 3-7 subtopics with seed queries.
pub fn plan_prompt(query: &str) -> String {
    format!(
        "Decompose the research query into 3-7 focused subtopics. For each, \
         give a stable id (s1, s2, ...), a short title, a one-sentence \
         description, and 3 search queries (one direct, one broader, one \
         narrower).\n\n\
         Query: {query}\n\n\
         Respond with JSON: {{\"subtopics\": [{{\"id\": \"s1\", \
         \"title\": \"...\", \"description\": \"...\", \
         \"search_queries\": [\"...\", \"...\", \"...\"]}}]}}"
    )
}

/// Summarize: scraped pages for one subtopic → summary + citations.
pub fn summarize_prompt(title: &str, pages: &[&ScrapedPage], target_words: usize) -> String {
    let mut sources = String::new();
    for (index, page) in pages.iter().enumerate() {
        let content = page.content.as_deref().unwrap_or("");
        sources.push_str(&format!(
            "--- Source {} ({}){}\n{}\n\n",
            index + 1,
            page.url,
            if page.flagged { " [low confidence]" } else { "" },
            content
        ));
    }

    format!(
        "Summarize the findings on \"{title}\" in roughly {target_words} words \
         of dense prose, using only the sources below. List the URLs you \
         actually drew from.\n\n{sources}\
         Respond with JSON: {{\"summary\": \"...\", \"citations\": [\"url\", ...]}}"
    )
}

/// Synthesize: all summaries + the numbered source index → final report
/// sections. Inline citations reference the index as [n].
pub fn synthesize_prompt(
    query: &str,
    summaries: &[SubtopicSummary],
    numbered_sources: &str,
    max_words: usize,
) -> String {
    let mut findings = String::new();
    for summary in summaries {
        findings.push_str(&format!(
            "### {} (id: {})\n{}\n\n",
            summary.title, summary.subtopic_id, summary.summary
        ));
    }

    format!(
        "Write the final research report for the query below, at most \
         {max_words} words, from these subtopic findings. Cite sources \
         inline as [n] using ONLY the numbered source list. Every section \
         must cite at least one source where evidence is used.\n\n\
         Query: {query}\n\n\
         Findings:\n{findings}\
         Sources:\n{numbered_sources}\n\n\
         Respond with JSON: {{\"title\": \"...\", \
         \"executive_summary\": \"...\", \
         \"findings\": [{{\"subtopic_id\": \"s1\", \"heading\": \"...\", \
         \"body\": \"...\"}}], \
         \"conclusions\": \"...\"}}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_prompt_mentions_query() {
        let prompt = plan_prompt("what is a vector database?");
        assert!(prompt.contains("what is a vector database?"));
        assert!(prompt.contains("subtopics"));
    }

    #[test]
    fn test_summarize_prompt_includes_sources_and_flags() {
        let page = ScrapedPage {
            url: "https://a.example/".into(),
            content: Some("page text".into()),
            quality_score: 0.5,
            word_count: 2,
            subtopic_id: "s1".into(),
            flagged: true,
        };
        let prompt = summarize_prompt("Indexing", &[&page], 200);
        assert!(prompt.contains("https://a.example/"));
        assert!(prompt.contains("[low confidence]"));
        assert!(prompt.contains("page text"));
    }

    #[test]
    fn test_prompts_are_deterministic() {
        let a = plan_prompt("q");
        let b = plan_prompt("q");
        assert_eq!(a, b);
    }
}
