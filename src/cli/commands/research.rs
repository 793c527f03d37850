//! `fathom research` - run or resume a research pipeline

use std::io::{BufRead, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use console::style;
use tracing::{error, info, warn};

use crate::budget::{BudgetConfig, BudgetTracker};
use crate::config::{Config, ConfigLoader};
use crate::llm::{
    AnthropicProvider, ModelRouter, ModelRouterBuilder, OpenAiProvider, RouterConfig,
    SharedLlmProvider,
};
use crate::persist::{CheckpointStore, EventLog, ProgressReport, RunDirs};
use crate::pipeline::{
    Executor, ExecutorConfig, ShutdownCoordinator, StageOptions, StageServices,
};
use crate::scrape::{HttpExtractor, RenderExtractor, ScrapeConfig, Scraper};
use crate::search::{SearchConfig, SearchService, TavilyProvider};
use crate::state::ResearchState;
use crate::types::{FathomError, Result, RunId};

/// Options from the CLI surface.
#[derive(Debug, Default)]
pub struct ResearchOptions {
    pub query: Option<String>,
    pub resume: Option<String>,
    pub max_cost: Option<f64>,
    pub output: Option<PathBuf>,
    pub model: Option<String>,
    pub no_approve: bool,
}

/// Run the pipeline; returns the process exit code.
pub async fn run(options: ResearchOptions) -> Result<i32> {
    let mut config = ConfigLoader::load()?;
    if let Some(max_cost) = options.max_cost {
        config.costs.max_per_run = max_cost;
    }
    if let Some(model) = &options.model {
        config.llm.primary_model = model.clone();
    }
    config.validate()?;

    let (run_id, resuming) = match &options.resume {
        Some(id) => (RunId::new(id.clone()), true),
        None => (RunId::generate(), false),
    };

    let query = match (&options.query, resuming) {
        (Some(query), _) => query.clone(),
        (None, true) => String::new(), // the checkpoint carries the query
        (None, false) => {
            return Err(FathomError::Config(
                "a query is required unless --resume is given".to_string(),
            ));
        }
    };

    if !resuming && !options.no_approve && !confirm_start(&query, config.costs.max_per_run) {
        println!("Aborted.");
        return Ok(0);
    }

    // Per-run persistence
    let dirs = if resuming {
        RunDirs::open(&config.checkpoints.dir, run_id.clone())?
    } else {
        RunDirs::create(&config.checkpoints.dir, run_id.clone())?
    };
    let events = Arc::new(EventLog::open(&dirs.events_path())?);
    let checkpoints = CheckpointStore::new(dirs.root(), config.checkpoints.max_keep);
    let budget = Arc::new(BudgetTracker::new(BudgetConfig {
        max_cost: config.costs.max_per_run,
        warn_fraction: config.costs.warn_fraction,
        ..Default::default()
    }));

    // Interrupt handling: first ^C drains, second within 2s aborts
    let shutdown = Arc::new(ShutdownCoordinator::default());
    {
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            loop {
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
                shutdown.signal();
            }
        });
    }

    let router = build_router(&config, Arc::clone(&budget), Arc::clone(&events))?;
    let services = build_services(&config, Arc::clone(&router), &dirs)?;

    let mut executor = Executor::new(
        services,
        Arc::clone(&shutdown),
        events,
        checkpoints,
        budget,
        ExecutorConfig::default(),
    );

    println!(
        "{} {} (run {})",
        style("Researching:").bold(),
        if resuming { "<resumed>" } else { query.as_str() },
        style(run_id.as_str()).cyan()
    );

    let outcome = if resuming {
        match executor.run_resumed().await {
            // Every checkpoint corrupt or missing: restart from scratch
            // when the caller supplied the query again
            Err(FathomError::CheckpointMissing(dir)) if options.query.is_some() => {
                warn!(
                    dir = %dir.display(),
                    "no valid checkpoint survives, restarting run from scratch"
                );
                executor
                    .run_fresh(ResearchState::new(run_id.clone(), &query))
                    .await
            }
            other => other,
        }
    } else {
        executor
            .run_fresh(ResearchState::new(run_id.clone(), &query))
            .await
    };

    match outcome {
        Ok(state) => {
            let report_path = write_report(&config, &options, &state)?;
            print_summary(&state, &report_path, dirs.progress_path());
            if shutdown.should_stop() {
                // Drained after an interrupt: partial report produced
                Ok(130)
            } else {
                Ok(0)
            }
        }
        Err(FathomError::Cancelled) => {
            eprintln!(
                "\nInterrupted. Resume with: {}",
                style(format!("fathom research --resume {}", run_id)).green()
            );
            Ok(130)
        }
        Err(err) => {
            error!(error = %err, "run failed");
            eprintln!(
                "\n{} {}\nPartial results in {}\nResume with: {}",
                style("Run failed:").red().bold(),
                err,
                dirs.root().display(),
                style(format!("fathom research --resume {}", run_id)).green()
            );
            Ok(1)
        }
    }
}

/// Build the model router from the configured role table. A provider
/// whose key is missing is skipped with a warning; at least one must
/// construct.
fn build_router(
    config: &Config,
    budget: Arc<BudgetTracker>,
    events: Arc<EventLog>,
) -> Result<Arc<ModelRouter>> {
    let timeout = Duration::from_secs(config.llm.timeout_secs);
    let mut builder = ModelRouterBuilder::new()
        .with_config(RouterConfig {
            call_timeout: timeout,
            ..Default::default()
        })
        .with_budget(budget)
        .with_events(events);
    let mut available = 0usize;

    match AnthropicProvider::new(
        &config.llm.primary_model,
        config.llm.anthropic_api_key.clone(),
        timeout,
    ) {
        Ok(provider) => {
            builder = builder.primary(Arc::new(provider) as SharedLlmProvider);
            available += 1;
        }
        Err(err) => warn!(error = %err, "primary model unavailable"),
    }

    match OpenAiProvider::new(
        &config.llm.fallback_model,
        config.llm.openai_api_key.clone(),
        None,
        timeout,
    ) {
        Ok(provider) => {
            builder = builder.fallback(Arc::new(provider) as SharedLlmProvider);
            available += 1;
        }
        Err(err) => warn!(error = %err, "fallback model unavailable"),
    }

    match OpenAiProvider::new(
        &config.llm.budget_model,
        config.llm.openai_api_key.clone(),
        None,
        timeout,
    ) {
        Ok(provider) => {
            builder = builder.budget_model(Arc::new(provider) as SharedLlmProvider);
            available += 1;
        }
        Err(err) => warn!(error = %err, "budget model unavailable"),
    }

    if available == 0 {
        return Err(FathomError::Config(
            "no LLM provider could be configured; set ANTHROPIC_API_KEY or OPENAI_API_KEY"
                .to_string(),
        ));
    }

    Ok(Arc::new(builder.build()))
}

fn build_services(
    config: &Config,
    router: Arc<ModelRouter>,
    dirs: &RunDirs,
) -> Result<StageServices> {
    let search_timeout = Duration::from_secs(crate::constants::search::TIMEOUT_SECS);
    let tavily = TavilyProvider::new(config.search.tavily_api_key.clone(), search_timeout)?;

    let search = Arc::new(SearchService::new(
        vec![Arc::new(tavily) as Arc<dyn crate::search::SearchProvider>],
        Arc::clone(&router),
        SearchConfig {
            max_results: config.search.max_results,
            depth: config.search.depth.parse().map_err(FathomError::Config)?,
            min_score: config.search.min_score,
            max_concurrent: config.search.max_concurrent,
            inter_call_delay: Duration::from_millis(config.search.inter_call_delay_ms),
        },
    ));

    let scrape_timeout = Duration::from_secs(config.scrape.timeout_secs);
    let primary = Arc::new(HttpExtractor::new(scrape_timeout)?);
    let fallback = match RenderExtractor::new(config.search.tavily_api_key.clone(), scrape_timeout)
    {
        Ok(extractor) => Some(Arc::new(extractor) as Arc<dyn crate::scrape::Extractor>),
        Err(err) => {
            warn!(error = %err, "JS-capable fallback extractor unavailable");
            None
        }
    };
    let scraper = Arc::new(Scraper::new(
        primary,
        fallback,
        ScrapeConfig {
            quality_reject: config.scrape.quality_reject,
            quality_accept: config.scrape.quality_accept,
            max_concurrent: config.scrape.max_concurrent,
            timeout: scrape_timeout,
            ..Default::default()
        },
    ));

    Ok(StageServices {
        router,
        search,
        scraper,
        progress: ProgressReport::new(&dirs.progress_path()),
        options: StageOptions {
            temperature: config.llm.temperature,
            report_max_words: config.report.max_words,
        },
    })
}

fn confirm_start(query: &str, max_cost: f64) -> bool {
    if !std::io::stdin().is_terminal() {
        return true;
    }
    println!(
        "Research {} with a cost ceiling of {}? [Y/n]",
        style(query).bold(),
        style(format!("${:.2}", max_cost)).yellow()
    );
    let mut line = String::new();
    if std::io::stdin().lock().read_line(&mut line).is_err() {
        return true;
    }
    let answer = line.trim().to_lowercase();
    answer.is_empty() || answer == "y" || answer == "yes"
}

fn write_report(
    config: &Config,
    options: &ResearchOptions,
    state: &ResearchState,
) -> Result<PathBuf> {
    let path = options.output.clone().unwrap_or_else(|| {
        config
            .report
            .output_dir
            .join(format!("research_{}.md", state.run_id))
    });

    if let Some(report) = &state.final_report {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, report)?;
        info!(path = %path.display(), "report written");
    }
    Ok(path)
}

fn print_summary(state: &ResearchState, report_path: &PathBuf, progress_path: PathBuf) {
    println!();
    if state.final_report.is_some() {
        println!("{} {}", style("Report:").bold(), report_path.display());
    } else {
        println!(
            "{} {}",
            style("Partial progress:").bold(),
            progress_path.display()
        );
    }
    if let Some(metadata) = &state.report_metadata {
        println!(
            "  {} words, {} sources, {} of {} subtopics covered",
            metadata.word_count,
            metadata.source_count,
            metadata.subtopics_covered,
            state.subtopics.len()
        );
        if !metadata.skipped_subtopics.is_empty() {
            println!(
                "  {} skipped: {}",
                style("coverage gaps").yellow(),
                metadata.skipped_subtopics.join(", ")
            );
        }
    }
    println!(
        "  cost ${:.4}, {} tokens, tier {}",
        state.total_cost, state.total_tokens, state.degradation_tier
    );
}
