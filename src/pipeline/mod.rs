//! Research Pipeline
//!
//! The orchestration core: stage functions, the graph executor with its
//! conditional routing and checkpoint hooks, the degradation tier state
//! machine, cooperative shutdown, and final report assembly.
//!
//! ## Modules
//!
//! - [`executor`]: run loop, routing table, resume
//! - [`stages`]: plan / search / scrape / summarize / synthesize
//! - [`degradation`]: FULL → REDUCED → CACHED → PARTIAL controller
//! - [`shutdown`]: stop flag with double-signal escalation
//! - [`report`]: citation index and Markdown rendering
//! - [`prompts`]: deterministic stage prompt builders

pub mod degradation;
pub mod executor;
pub mod prompts;
pub mod report;
pub mod shutdown;
pub mod stages;

pub use degradation::{DegradationController, TierChange};
pub use executor::{Executor, ExecutorConfig, Node, resume_node};
pub use report::CitationIndex;
pub use shutdown::{ShutdownCoordinator, StopKind};
pub use stages::{StageOptions, StageOutcome, StageServices};
