//! Configuration Management
//!
//! Unified configuration system with hierarchical resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/fathom/config.toml)
//! 3. Project config (.fathom/config.toml)
//! 4. Environment variables (FATHOM_*)

mod loader;
mod types;

pub use loader::ConfigLoader;
pub use types::{
    CheckpointsConfig, Config, CostsConfig, LlmConfig, ReportConfig, ScrapeSettings,
    SearchSettings,
};
