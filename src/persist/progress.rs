//! Progressive Report Writer
//!
//! Grows `progress.md` one section per completed subtopic summary. The
//! file is the guaranteed minimum deliverable: if the pipeline crashes
//! before synthesis, everything summarized so far is already readable.
//! Sections are only ever appended, never rewritten.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::state::SubtopicSummary;
use crate::types::Result;

/// Appender for the per-run progressive report.
pub struct ProgressReport {
    path: PathBuf,
}

impl ProgressReport {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the header once, when the file does not exist yet.
    pub fn init(&self, query: &str) -> Result<()> {
        if self.path.exists() {
            return Ok(());
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "# Research in progress\n")?;
        writeln!(file, "Query: {}\n", query)?;
        file.flush()?;
        Ok(())
    }

    /// Append one completed subtopic section with its citations.
    pub fn append_summary(&self, summary: &SubtopicSummary) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        writeln!(file, "## {}\n", summary.title)?;
        writeln!(file, "{}\n", summary.summary.trim())?;
        if !summary.citations.is_empty() {
            writeln!(file, "Sources:")?;
            for url in &summary.citations {
                writeln!(file, "- {}", url)?;
            }
            writeln!(file)?;
        }
        file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn summary(id: &str, title: &str) -> SubtopicSummary {
        SubtopicSummary {
            subtopic_id: id.into(),
            title: title.into(),
            summary: "Findings here.".into(),
            citations: vec!["https://example.com/a".into()],
            token_count: 10,
        }
    }

    #[test]
    fn test_init_writes_header_once() {
        let tmp = TempDir::new().unwrap();
        let report = ProgressReport::new(&tmp.path().join("progress.md"));

        report.init("what is x?").unwrap();
        report.init("what is x?").unwrap();

        let text = std::fs::read_to_string(report.path()).unwrap();
        assert_eq!(text.matches("# Research in progress").count(), 1);
        assert!(text.contains("Query: what is x?"));
    }

    #[test]
    fn test_sections_append_without_rewrite() {
        let tmp = TempDir::new().unwrap();
        let report = ProgressReport::new(&tmp.path().join("progress.md"));
        report.init("q").unwrap();

        report.append_summary(&summary("s1", "First topic")).unwrap();
        let after_first = std::fs::read_to_string(report.path()).unwrap();

        report.append_summary(&summary("s2", "Second topic")).unwrap();
        let after_second = std::fs::read_to_string(report.path()).unwrap();

        // Earlier content is a strict prefix: nothing was rewritten
        assert!(after_second.starts_with(&after_first));
        assert!(after_second.contains("## First topic"));
        assert!(after_second.contains("## Second topic"));
        assert!(after_second.contains("- https://example.com/a"));
    }
}
