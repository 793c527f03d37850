//! Event Log
//!
//! Append-only newline-delimited JSON audit trail, one file per run.
//! Every write reaches the OS buffer before the call returns; per-event
//! fsync is deliberately skipped (the checkpoint store provides the
//! durability barrier). Entries are totally ordered by `step_id` and
//! provenance is reconstructible by following `parent_id`.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::Result;

/// Kinds of events recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    NodeEnter,
    NodeExit,
    Error,
    BudgetTick,
    TierChange,
    CheckpointWritten,
}

/// One audit trail entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEntry {
    pub ts: DateTime<Utc>,
    pub step_id: u64,
    pub parent_id: Option<u64>,
    pub event: EventKind,
    pub node: String,
    pub payload: Value,
}

/// Append-only event log for one run.
///
/// Thread-safe: the file handle is mutex-guarded and step ids come from
/// an atomic counter, so concurrent in-stage fan-out may log safely.
pub struct EventLog {
    path: PathBuf,
    file: Mutex<File>,
    next_step: AtomicU64,
}

impl EventLog {
    /// Open (or create) the log, resuming the step counter from the
    /// highest step id already on disk.
    pub fn open(path: &Path) -> Result<Self> {
        let next_step = if path.exists() {
            last_step_id(path)?.map(|id| id + 1).unwrap_or(0)
        } else {
            0
        };

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            next_step: AtomicU64::new(next_step),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event and return its step id.
    pub fn append(
        &self,
        event: EventKind,
        node: &str,
        parent_id: Option<u64>,
        payload: Value,
    ) -> Result<u64> {
        let step_id = self.next_step.fetch_add(1, Ordering::SeqCst);
        let entry = EventEntry {
            ts: Utc::now(),
            step_id,
            parent_id,
            event,
            node: node.to_string(),
            payload,
        };

        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let mut file = self
            .file
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        file.write_all(line.as_bytes())?;
        file.flush()?;

        Ok(step_id)
    }

    /// Read every entry back (diagnostics and tests).
    pub fn read_all(&self) -> Result<Vec<EventEntry>> {
        read_entries(&self.path)
    }
}

/// Parse all entries from a log file, skipping lines that fail to parse
/// (a torn final line after a crash is expected, not an error).
pub fn read_entries(path: &Path) -> Result<Vec<EventEntry>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let mut entries = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<EventEntry>(&line) {
            Ok(entry) => entries.push(entry),
            Err(err) => {
                tracing::warn!(error = %err, "skipping unparseable event log line");
            }
        }
    }
    Ok(entries)
}

fn last_step_id(path: &Path) -> Result<Option<u64>> {
    Ok(read_entries(path)?.last().map(|e| e.step_id))
}
