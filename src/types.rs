// src/types.rs

use std::fmt;

use serde::{Deserialize, Serialize};

/// Canonical stage name type used throughout the crate.
pub type StageName = String;

/// Per-stage outcome of the reuse evaluation for one orchestration run.
///
/// - `Reuse`: a previous successful result under an identical spec and
///   environment is trusted; nothing is submitted.
/// - `Skip`: the user asked for this stage to be skipped (`--skip`).
/// - `Submit`: the stage is (re)run.
///
/// A decision can be demoted from `Reuse` to `Submit` by the consistency pass
/// but is never promoted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decision {
    Reuse,
    Skip,
    Submit,
}

impl Decision {
    pub fn label(self) -> &'static str {
        match self {
            Decision::Reuse => "REUSE",
            Decision::Skip => "SKIP",
            Decision::Submit => "SUBMIT",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.label())
    }
}

/// Which executor actually runs the stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Submit batch scripts to a SLURM cluster.
    Slurm,
    /// Run each stage as a local subprocess, one after another.
    Local,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Slurm => write!(f, "slurm"),
            BackendKind::Local => write!(f, "local"),
        }
    }
}
