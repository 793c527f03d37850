use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fathom::cli::commands;
use fathom::cli::commands::research::ResearchOptions;

#[derive(Parser)]
#[command(name = "fathom")]
#[command(version, about = "Crash-resilient deep-research agent")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long)]
    verbose: bool,

    #[arg(long, short)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run (or resume) a research pipeline
    Research {
        #[arg(help = "The research query")]
        query: Option<String>,
        #[arg(long, help = "Resume a previous run by id")]
        resume: Option<String>,
        #[arg(long, help = "Cost ceiling for this run in USD")]
        max_cost: Option<f64>,
        #[arg(long, short, help = "Report output path")]
        output: Option<PathBuf>,
        #[arg(long, help = "Override the primary model id")]
        model: Option<String>,
        #[arg(long, help = "Skip the start confirmation prompt")]
        no_approve: bool,
    },

    /// Show run status
    Status {
        #[arg(help = "Run id to inspect (all runs when omitted)")]
        run_id: Option<String>,
    },

    /// Remove run data
    Clean {
        #[arg(long, help = "Remove every run")]
        all: bool,
        #[arg(long, help = "Remove one run by id")]
        run: Option<String>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration (merged from all sources)
    Show {
        #[arg(long, help = "Output as JSON instead of TOML")]
        json: bool,
    },
    /// Show configuration file paths
    Path,
    /// Initialize project configuration
    Init,
}

/// Set up panic handler for graceful error reporting
fn setup_panic_handler() {
    let default_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info| {
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("\n\x1b[1;31m━━━ PANIC ━━━\x1b[0m");
        eprintln!("\x1b[31mFathom encountered an unexpected error:\x1b[0m");
        eprintln!("  {}", message);

        if let Some(location) = panic_info.location() {
            eprintln!(
                "\x1b[90mLocation: {}:{}:{}\x1b[0m",
                location.file(),
                location.line(),
                location.column()
            );
        }
        eprintln!();

        default_hook(panic_info);
    }));
}

fn main() -> ExitCode {
    setup_panic_handler();

    match run_cli() {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("\x1b[31mError:\x1b[0m {}", e);
            let code = match e.downcast_ref::<fathom::FathomError>() {
                Some(fathom::FathomError::Config(_)) => 2,
                Some(fathom::FathomError::Cancelled) => 130,
                _ => 1,
            };
            ExitCode::from(code)
        }
    }
}

fn run_cli() -> anyhow::Result<u8> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Research {
            query,
            resume,
            max_cost,
            output,
            model,
            no_approve,
        } => {
            let runtime = tokio::runtime::Runtime::new()?;
            let code = runtime.block_on(commands::research::run(ResearchOptions {
                query,
                resume,
                max_cost,
                output,
                model,
                no_approve,
            }))?;
            Ok(code as u8)
        }
        Commands::Status { run_id } => {
            commands::status::run(run_id)?;
            Ok(0)
        }
        Commands::Clean { all, run } => {
            commands::clean::run(all, run)?;
            Ok(0)
        }
        Commands::Config { action } => {
            match action {
                ConfigAction::Show { json } => commands::config::show(json)?,
                ConfigAction::Path => commands::config::path()?,
                ConfigAction::Init => commands::config::init()?,
            }
            Ok(0)
        }
    }
}
