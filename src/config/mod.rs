// src/config/mod.rs

//! Configuration loading and validation for batchdag.
//!
//! Responsibilities:
//! - Define the TOML-backed pipeline data model (`model.rs`).
//! - Load a pipeline file from disk (`loader.rs`).
//! - Validate the schema into typed stage declarations (`validate.rs`).
//! - Describe cluster sites and their hardware (`site.rs`).

pub mod loader;
pub mod model;
pub mod site;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, load_plan};
pub use model::{
    DeclaredStage, ExecKind, OptionValue, PipelineConfig, RawArg, RawParallel,
    RawPipelineConfig, RawStageConfig, ScalarArg, StageArg, StageDeclarations, TrackedEntry,
};
pub use site::{NodeHardware, SiteConfig, SiteOverrides, SiteProfile};
