//! `fathom config` - inspect and initialize configuration

use crate::config::ConfigLoader;
use crate::types::Result;

/// Show the merged effective configuration.
pub fn show(as_json: bool) -> Result<()> {
    ConfigLoader::show_config(as_json)
}

/// Show configuration file paths.
pub fn path() -> Result<()> {
    ConfigLoader::show_path();
    Ok(())
}

/// Initialize project configuration.
pub fn init() -> Result<()> {
    let dir = ConfigLoader::init_project()?;
    println!("Initialized {}", dir.display());
    Ok(())
}
