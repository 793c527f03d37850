//! Fathom - Crash-Resilient Deep-Research Agent
//!
//! Given a natural-language query, Fathom plans subtopics, drives web
//! search and content extraction through a staged pipeline, and emits a
//! cited Markdown report. The orchestration core is built for failure:
//! full state is checkpointed atomically after every stage, a cost
//! budget degrades the run gracefully instead of killing it, and a
//! crashed run resumes from its last valid checkpoint.
//!
//! ## Core Features
//!
//! - **Graph Executor**: explicit-loop state graph with conditional routing
//! - **Checkpoint/Resume**: atomic snapshots with SHA-256 integrity sidecars
//! - **Cost Budget**: per-run USD ceiling with FULL/REDUCED/CACHED/PARTIAL tiers
//! - **Model Router**: provider fallback chain with retries and circuit breakers
//! - **Progressive Report**: readable output grows per subtopic, crash or not
//!
//! ## Quick Start
//!
//! ```ignore
//! use fathom::cli::commands::research::{self, ResearchOptions};
//!
//! let code = research::run(ResearchOptions {
//!     query: Some("What is a vector database?".into()),
//!     ..Default::default()
//! })
//! .await?;
//! ```
//!
//! ## Modules
//!
//! - [`pipeline`]: executor, stages, degradation, shutdown, report
//! - [`state`]: typed research state with append/union/overwrite reducers
//! - [`persist`]: event log, checkpoint store, progressive report
//! - [`llm`]: provider abstraction and the model router
//! - [`search`] / [`scrape`]: gathering services with bounded concurrency
//! - [`config`]: figment-merged configuration

pub mod budget;
pub mod cli;
pub mod config;
pub mod constants;
pub mod llm;
pub mod persist;
pub mod pipeline;
pub mod scrape;
pub mod search;
pub mod state;
pub mod types;

// =============================================================================
// Core Re-exports
// =============================================================================

// Configuration
pub use config::{Config, ConfigLoader};

// Error Types
pub use types::{ErrorCategory, FathomError, Result, RunId};

// State
pub use state::{DegradationTier, ResearchState, StateUpdate};

// =============================================================================
// Pipeline Re-exports
// =============================================================================

pub use pipeline::{
    Executor, ExecutorConfig, Node, ShutdownCoordinator, StageOptions, StageServices, resume_node,
};

// =============================================================================
// Service Re-exports
// =============================================================================

pub use budget::{BudgetConfig, BudgetTracker};
pub use llm::{LlmProvider, ModelRouter, ModelRouterBuilder};
pub use persist::{CheckpointStore, EventLog, ProgressReport, RunDirs};
pub use scrape::Scraper;
pub use search::SearchService;
