// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{PlannerConfig, RawPlannerConfig};
use crate::errors::Result;

/// Read and deserialize a config file without semantic validation. Use
/// [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawPlannerConfig> {
    let contents = fs::read_to_string(path.as_ref())?;
    let config: RawPlannerConfig = toml::from_str(&contents)?;
    Ok(config)
}

/// Read, deserialize and validate a config file.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<PlannerConfig> {
    let raw_config = load_from_path(&path)?;
    let config = PlannerConfig::try_from(raw_config)?;
    Ok(config)
}

/// `Dagplan.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Dagplan.toml")
}
