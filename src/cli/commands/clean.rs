//! `fathom clean` - remove run data

use crate::config::ConfigLoader;
use crate::persist;
use crate::types::{FathomError, Result};

/// Remove one run's directory, or every run with `--all`.
pub fn run(all: bool, run_id: Option<String>) -> Result<()> {
    let config = ConfigLoader::load()?;
    let root = &config.checkpoints.dir;

    match (all, run_id) {
        (true, _) => {
            let runs = persist::list_runs(root)?;
            for run in &runs {
                std::fs::remove_dir_all(root.join(run.as_str()))?;
            }
            println!("Removed {} run(s).", runs.len());
            Ok(())
        }
        (false, Some(id)) => {
            let path = root.join(&id);
            if !path.is_dir() {
                return Err(FathomError::Config(format!("no such run: {}", id)));
            }
            std::fs::remove_dir_all(&path)?;
            println!("Removed run {}.", id);
            Ok(())
        }
        (false, None) => Err(FathomError::Config(
            "specify --all or --run <id>".to_string(),
        )),
    }
}
