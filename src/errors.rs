// src/errors.rs

//! Crate-wide error type and helpers.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BatchdagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Cycle detected in stage graph: {0}")]
    DagCycle(String),

    /// A provenance file that should exist could not be read or parsed.
    ///
    /// This one is recoverable: the reuse engine turns it into a SUBMIT
    /// decision instead of aborting the run.
    #[error("Could not read provenance for stage '{stage}' at {path:?}: {reason}")]
    ProvenanceRead {
        stage: String,
        path: PathBuf,
        reason: String,
    },

    #[error("Backend failed for stage '{stage}': {output}")]
    Backend { stage: String, output: String },

    #[error("Internal invariant violated (please report this bug): {0}")]
    InternalInvariant(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerError(#[from] toml::ser::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BatchdagError {
    /// Shorthand used all over config validation.
    pub fn config(msg: impl Into<String>) -> Self {
        BatchdagError::ConfigError(msg.into())
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, BatchdagError>;
