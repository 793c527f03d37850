//! Run Persistence
//!
//! Three-layer persistence for a run, all under one directory:
//!
//! ```text
//! {checkpoints.dir}/{run_id}/
//!   events.jsonl            append-only audit trail
//!   checkpoint_NNNN.json    atomic state snapshots
//!   checkpoint_NNNN.sha256  integrity sidecars
//!   progress.md             progressive report
//!   quarantine/             corrupted checkpoints, kept for inspection
//! ```
//!
//! The directory belongs to exactly one run; no other process may write it.

pub mod checkpoint;
pub mod event_log;
pub mod progress;

pub use checkpoint::CheckpointStore;
pub use event_log::{EventKind, EventLog};
pub use progress::ProgressReport;

use std::fs;
use std::path::{Path, PathBuf};

use crate::types::{Result, RunId};

/// Resolved filesystem layout for one run.
#[derive(Debug, Clone)]
pub struct RunDirs {
    root: PathBuf,
    run_id: RunId,
}

impl RunDirs {
    /// Resolve (and create) the directory for a run under the checkpoint root.
    pub fn create(checkpoint_root: &Path, run_id: RunId) -> Result<Self> {
        let root = checkpoint_root.join(run_id.as_str());
        fs::create_dir_all(&root)?;
        Ok(Self { root, run_id })
    }

    /// Open an existing run directory without creating it.
    pub fn open(checkpoint_root: &Path, run_id: RunId) -> Result<Self> {
        let root = checkpoint_root.join(run_id.as_str());
        if !root.is_dir() {
            return Err(crate::types::FathomError::Config(format!(
                "no such run: {} (looked in {})",
                run_id,
                checkpoint_root.display()
            )));
        }
        Ok(Self { root, run_id })
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn events_path(&self) -> PathBuf {
        self.root.join("events.jsonl")
    }

    pub fn progress_path(&self) -> PathBuf {
        self.root.join("progress.md")
    }

    pub fn quarantine_dir(&self) -> PathBuf {
        self.root.join("quarantine")
    }
}

/// List run ids under the checkpoint root, newest modification first.
pub fn list_runs(checkpoint_root: &Path) -> Result<Vec<RunId>> {
    if !checkpoint_root.is_dir() {
        return Ok(Vec::new());
    }

    let mut entries: Vec<(std::time::SystemTime, RunId)> = Vec::new();
    for entry in fs::read_dir(checkpoint_root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let modified = entry.metadata()?.modified()?;
        if let Some(name) = entry.file_name().to_str() {
            entries.push((modified, RunId::new(name)));
        }
    }

    entries.sort_by(|a, b| b.0.cmp(&a.0));
    Ok(entries.into_iter().map(|(_, id)| id).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_and_open() {
        let tmp = TempDir::new().unwrap();
        let dirs = RunDirs::create(tmp.path(), RunId::new("run-a")).unwrap();
        assert!(dirs.root().is_dir());

        let reopened = RunDirs::open(tmp.path(), RunId::new("run-a")).unwrap();
        assert_eq!(reopened.root(), dirs.root());
    }

    #[test]
    fn test_open_missing_run_fails() {
        let tmp = TempDir::new().unwrap();
        assert!(RunDirs::open(tmp.path(), RunId::new("nope")).is_err());
    }

    #[test]
    fn test_list_runs() {
        let tmp = TempDir::new().unwrap();
        RunDirs::create(tmp.path(), RunId::new("run-a")).unwrap();
        RunDirs::create(tmp.path(), RunId::new("run-b")).unwrap();

        let runs = list_runs(tmp.path()).unwrap();
        assert_eq!(runs.len(), 2);
    }

    #[test]
    fn test_list_runs_empty_root() {
        let tmp = TempDir::new().unwrap();
        let runs = list_runs(&tmp.path().join("missing")).unwrap();
        assert!(runs.is_empty());
    }
}
