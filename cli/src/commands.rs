pub mod apply;
pub mod convert;
pub mod export;
pub mod merge;

use std::path::Path;

use anyhow::{Context, Result};
use polymesh::config::Settings;

/// Load the optional settings file, or the empty defaults.
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    match path {
        Some(path) => Settings::read(path)
            .with_context(|| format!("[config] Failed to read settings from {}", path.display())),
        None => Ok(Settings::default()),
    }
}

/// Worker count from the flag, then the settings file, then 1.
#[inline]
pub fn workers(flag: Option<usize>, settings: &Settings) -> usize {
    flag.or(settings.workers).unwrap_or(1)
}
