//! `fathom status` - list runs and their latest checkpoint state

use console::style;

use crate::config::ConfigLoader;
use crate::persist::{self, CheckpointStore};
use crate::types::{Result, RunId};

/// Show all runs, or details for one.
pub fn run(run_id: Option<String>) -> Result<()> {
    let config = ConfigLoader::load()?;

    match run_id {
        Some(id) => show_run(
            &config.checkpoints.dir,
            RunId::new(id),
            config.checkpoints.max_keep,
        ),
        None => list_all(&config.checkpoints.dir, config.checkpoints.max_keep),
    }
}

fn list_all(root: &std::path::Path, max_keep: usize) -> Result<()> {
    let runs = persist::list_runs(root)?;
    if runs.is_empty() {
        println!("No runs found under {}", root.display());
        return Ok(());
    }

    println!("{}", style("Runs (newest first):").bold());
    for run_id in runs {
        let store = CheckpointStore::new(&root.join(run_id.as_str()), max_keep);
        match store.latest_valid()? {
            Some((step, state)) => {
                let status = if state.final_report.is_some() {
                    style("complete").green().to_string()
                } else {
                    style(format!(
                        "in progress ({}/{} subtopics)",
                        state.subtopic_summaries.len(),
                        state.subtopics.len()
                    ))
                    .yellow()
                    .to_string()
                };
                println!(
                    "  {}  step {:>3}  ${:.4}  {}  {}",
                    style(run_id.as_str()).cyan(),
                    step,
                    state.total_cost,
                    status,
                    truncate(&state.query, 48),
                );
            }
            None => {
                println!(
                    "  {}  {}",
                    style(run_id.as_str()).cyan(),
                    style("no valid checkpoint").red()
                );
            }
        }
    }
    Ok(())
}

fn show_run(root: &std::path::Path, run_id: RunId, max_keep: usize) -> Result<()> {
    let store = CheckpointStore::new(&root.join(run_id.as_str()), max_keep);
    let Some((step, state)) = store.latest_valid()? else {
        println!("No valid checkpoint for run {}", run_id);
        return Ok(());
    };

    println!("{} {}", style("Run:").bold(), run_id);
    println!("  query:     {}", state.query);
    println!("  step:      {}", step);
    println!("  tier:      {}", state.degradation_tier);
    println!("  cost:      ${:.4}", state.total_cost);
    println!("  tokens:    {}", state.total_tokens);
    println!("  errors:    {}", state.errors.len());
    println!("  subtopics:");
    for subtopic in &state.subtopics {
        println!(
            "    [{}] {} - {}",
            subtopic.id, subtopic.status, subtopic.title
        );
    }
    if state.final_report.is_some() {
        println!("  {}", style("report complete").green());
    } else {
        println!(
            "  resume with: {}",
            style(format!("fathom research --resume {}", run_id)).green()
        );
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        format!("{}…", s.chars().take(max).collect::<String>())
    }
}
