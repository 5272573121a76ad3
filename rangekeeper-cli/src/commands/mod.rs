//! CLI command implementations.

pub mod projects;
pub mod units;

use anyhow::{Context, Result};
use rangekeeper_core::{EngineConfig, Store};
use std::path::Path;

/// Open the store from an explicit settings file or the environment.
///
/// `state_dir` overrides whatever directory the settings name.
pub fn open_store(config_path: Option<&Path>, state_dir: Option<&Path>) -> Result<Store> {
    let mut config = match config_path {
        Some(path) => EngineConfig::load(path)
            .and_then(EngineConfig::with_env_overrides)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => EngineConfig::from_env().context("Failed to read settings from environment")?,
    };
    if let Some(dir) = state_dir {
        config = config.with_state_dir(dir);
    }

    tracing::debug!(state_dir = %config.state_dir.display(), "Opening store");
    Store::open(config).context("Failed to open state directory")
}
