// src/config/loader.rs

use std::fs;
use std::path::Path;

use crate::config::model::{PipelineConfig, RawPipelineConfig};
use crate::errors::Result;
use crate::plan::PipelinePlan;

/// Load a pipeline file from a given path and return the raw
/// `RawPipelineConfig`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawPipelineConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawPipelineConfig = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a pipeline file and validate its schema.
///
/// - Reads TOML.
/// - Checks exec kinds, argument shapes, global option collisions and
///   resource hint exclusivity.
///
/// Graph-level checks (dependency resolution, cycles, sweep name clashes)
/// happen in [`PipelinePlan::build`]; [`load_plan`] does both.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<PipelineConfig> {
    let raw_config = load_from_path(&path)?;
    let config = PipelineConfig::try_from(raw_config)?;
    Ok(config)
}

/// Load, validate and expand a pipeline file into an ordered plan.
pub fn load_plan(path: impl AsRef<Path>) -> Result<(PipelineConfig, PipelinePlan)> {
    let config = load_and_validate(path)?;
    let plan = PipelinePlan::build(&config)?;
    Ok((config, plan))
}
