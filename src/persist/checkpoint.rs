//! Checkpoint Store
//!
//! Atomic, hash-verified state snapshots. The write contract: after
//! `write` returns, `checkpoint_NNNN.json` either holds the complete
//! serialization of the state or does not exist — a partial file is
//! never observable. Protocol: serialize → SHA-256 → temp file in the
//! same directory → write → fsync file → atomic rename → fsync
//! directory → integrity sidecar.
//!
//! Recovery walks checkpoints newest-first, moving any that fail hash
//! verification into `quarantine/` instead of deleting them.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::constants::checkpoint::MIN_KEEP;
use crate::state::{ResearchState, migration};
use crate::types::{FathomError, Result};

/// Store managing the checkpoint stream of a single run directory.
pub struct CheckpointStore {
    dir: PathBuf,
    max_keep: usize,
}

impl CheckpointStore {
    /// Create a store over a run directory. `max_keep` has a floor of 2
    /// so a crash during the newest write always leaves a valid
    /// predecessor.
    pub fn new(dir: &Path, max_keep: usize) -> Self {
        Self {
            dir: dir.to_path_buf(),
            max_keep: max_keep.max(MIN_KEEP),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn data_path(&self, step: u64) -> PathBuf {
        self.dir.join(format!("checkpoint_{:04}.json", step))
    }

    fn sidecar_path(&self, step: u64) -> PathBuf {
        self.dir.join(format!("checkpoint_{:04}.sha256", step))
    }

    // =========================================================================
    // Write
    // =========================================================================

    /// Atomically write a checkpoint for `step`, then rotate old ones.
    pub fn write(&self, state: &ResearchState, step: u64) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;

        let bytes = serde_json::to_vec_pretty(state)?;
        let hash = hex_digest(&bytes);

        let dest = self.data_path(step);
        let tmp = self.dir.join(format!(".checkpoint_{:04}.json.tmp", step));

        // Any failure between temp creation and rename must remove the
        // temp file and propagate.
        if let Err(err) = write_durable(&tmp, &bytes) {
            let _ = fs::remove_file(&tmp);
            return Err(err);
        }
        if let Err(err) = fs::rename(&tmp, &dest) {
            let _ = fs::remove_file(&tmp);
            return Err(err.into());
        }
        fsync_dir(&self.dir)?;

        // Sidecar last: a checkpoint without one fails verification and
        // is quarantined on the next recovery scan, same as corruption.
        fs::write(self.sidecar_path(step), format!("{}\n", hash))?;

        tracing::debug!(step, path = %dest.display(), "checkpoint written");

        self.rotate()?;
        Ok(dest)
    }

    // =========================================================================
    // Read
    // =========================================================================

    /// Load and verify a specific checkpoint, migrating the schema forward.
    pub fn load_step(&self, step: u64) -> Result<ResearchState> {
        let data_path = self.data_path(step);
        let bytes = fs::read(&data_path)?;

        let expected = fs::read_to_string(self.sidecar_path(step))
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
        let actual = hex_digest(&bytes);

        if actual != expected {
            return Err(FathomError::CheckpointCorrupt {
                path: data_path,
                expected,
                actual,
            });
        }

        let raw: serde_json::Value = serde_json::from_slice(&bytes)?;
        let migrated = migration::migrate_to_current(raw)?;
        Ok(serde_json::from_value(migrated)?)
    }

    /// Steps with a data file on disk, ascending.
    pub fn list_steps(&self) -> Result<Vec<u64>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut steps = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if let Some(step) = parse_step(&entry.file_name().to_string_lossy()) {
                steps.push(step);
            }
        }
        steps.sort_unstable();
        Ok(steps)
    }

    /// Walk checkpoints newest-first and return the first that verifies.
    /// Corrupted ones (data + sidecar) are moved under `quarantine/`.
    pub fn latest_valid(&self) -> Result<Option<(u64, ResearchState)>> {
        let mut steps = self.list_steps()?;
        steps.reverse();

        for step in steps {
            match self.load_step(step) {
                Ok(state) => return Ok(Some((step, state))),
                Err(err) => {
                    tracing::warn!(step, error = %err, "quarantining bad checkpoint");
                    self.quarantine(step)?;
                }
            }
        }
        Ok(None)
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Move a checkpoint pair into the quarantine directory.
    fn quarantine(&self, step: u64) -> Result<()> {
        let quarantine = self.dir.join("quarantine");
        fs::create_dir_all(&quarantine)?;

        for path in [self.data_path(step), self.sidecar_path(step)] {
            if path.exists()
                && let Some(name) = path.file_name()
            {
                fs::rename(&path, quarantine.join(name))?;
            }
        }
        Ok(())
    }

    /// Delete the oldest checkpoints beyond the retention window.
    fn rotate(&self) -> Result<()> {
        let steps = self.list_steps()?;
        if steps.len() <= self.max_keep {
            return Ok(());
        }

        let excess = steps.len() - self.max_keep;
        for step in steps.into_iter().take(excess) {
            let _ = fs::remove_file(self.data_path(step));
            let _ = fs::remove_file(self.sidecar_path(step));
            tracing::debug!(step, "rotated out old checkpoint");
        }
        Ok(())
    }
}

fn hex_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Write bytes and force them to stable storage.
fn write_durable(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(())
}

/// Make a rename durable by syncing the containing directory.
fn fsync_dir(dir: &Path) -> Result<()> {
    // Directory fsync is a no-op on some platforms; errors are ignored
    // there but honored where it matters (Linux).
    if let Ok(handle) = File::open(dir) {
        handle.sync_all()?;
    }
    Ok(())
}

fn parse_step(name: &str) -> Option<u64> {
    name.strip_prefix("checkpoint_")?
        .strip_suffix(".json")?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RunId;
    use tempfile::TempDir;

    fn sample_state() -> ResearchState {
        ResearchState::new(RunId::new("cp-test"), "query")
    }

    #[test]
    fn test_write_then_load_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let store = CheckpointStore::new(tmp.path(), 5);

        let state = sample_state();
        store.write(&state, 1).unwrap();

        let loaded = store.load_step(1).unwrap();
        assert_eq!(loaded.query, state.query);
        assert_eq!(loaded.run_id, state.run_id);
    }

    #[test]
    fn test_sidecar_matches_bytes() {
        let tmp = TempDir::new().unwrap();
        let store = CheckpointStore::new(tmp.path(), 5);
        store.write(&sample_state(), 3).unwrap();

        let bytes = fs::read(tmp.path().join("checkpoint_0003.json")).unwrap();
        let sidecar = fs::read_to_string(tmp.path().join("checkpoint_0003.sha256")).unwrap();
        assert_eq!(sidecar.trim(), hex_digest(&bytes));
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let tmp = TempDir::new().unwrap();
        let store = CheckpointStore::new(tmp.path(), 5);
        store.write(&sample_state(), 1).unwrap();

        let leftovers: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_corrupted_checkpoint_detected() {
        let tmp = TempDir::new().unwrap();
        let store = CheckpointStore::new(tmp.path(), 5);
        store.write(&sample_state(), 1).unwrap();

        // Truncate the data file
        let path = tmp.path().join("checkpoint_0001.json");
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 50]).unwrap();

        let result = store.load_step(1);
        assert!(matches!(result, Err(FathomError::CheckpointCorrupt { .. })));
    }

    #[test]
    fn test_recovery_quarantines_and_falls_back() {
        let tmp = TempDir::new().unwrap();
        let store = CheckpointStore::new(tmp.path(), 5);

        let mut state = sample_state();
        store.write(&state, 4).unwrap();
        state.current_subtopic_index = 0;
        store.write(&state, 5).unwrap();

        // Corrupt the newest checkpoint
        let newest = tmp.path().join("checkpoint_0005.json");
        let bytes = fs::read(&newest).unwrap();
        fs::write(&newest, &bytes[..bytes.len() - 50]).unwrap();

        let (step, _loaded) = store.latest_valid().unwrap().unwrap();
        assert_eq!(step, 4);

        // Corrupt pair moved under quarantine/
        assert!(tmp.path().join("quarantine/checkpoint_0005.json").exists());
        assert!(tmp.path().join("quarantine/checkpoint_0005.sha256").exists());
        assert!(!newest.exists());
    }

    #[test]
    fn test_missing_sidecar_treated_as_corrupt() {
        let tmp = TempDir::new().unwrap();
        let store = CheckpointStore::new(tmp.path(), 5);
        store.write(&sample_state(), 1).unwrap();

        fs::remove_file(tmp.path().join("checkpoint_0001.sha256")).unwrap();
        assert!(matches!(
            store.load_step(1),
            Err(FathomError::CheckpointCorrupt { .. })
        ));
    }

    #[test]
    fn test_rotation_keeps_max() {
        let tmp = TempDir::new().unwrap();
        let store = CheckpointStore::new(tmp.path(), 3);

        let state = sample_state();
        for step in 1..=6 {
            store.write(&state, step).unwrap();
        }

        assert_eq!(store.list_steps().unwrap(), vec![4, 5, 6]);
    }

    #[test]
    fn test_rotation_floor_of_two() {
        let tmp = TempDir::new().unwrap();
        // Misconfigured to keep zero; floor must hold at 2
        let store = CheckpointStore::new(tmp.path(), 0);

        let state = sample_state();
        for step in 1..=5 {
            store.write(&state, step).unwrap();
        }

        assert_eq!(store.list_steps().unwrap(), vec![4, 5]);
    }

    #[test]
    fn test_latest_valid_empty_dir() {
        let tmp = TempDir::new().unwrap();
        let store = CheckpointStore::new(tmp.path(), 5);
        assert!(store.latest_valid().unwrap().is_none());
    }

    #[test]
    fn test_parse_step() {
        assert_eq!(parse_step("checkpoint_0001.json"), Some(1));
        assert_eq!(parse_step("checkpoint_0123.json"), Some(123));
        assert_eq!(parse_step("checkpoint_0001.sha256"), None);
        assert_eq!(parse_step("events.jsonl"), None);
    }
}
