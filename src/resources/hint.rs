// src/resources/hint.rs

//! Declarative per-stage resource hints (`[stage.<name>.parallel]`).

use crate::config::model::RawParallel;
use crate::errors::{BatchdagError, Result};

/// Wall-clock limit used when a stage does not declare one.
pub const DEFAULT_WALLTIME: &str = "00:15:00";

/// How the thread count of each process should be chosen.
#[derive(Debug, Clone, PartialEq)]
pub enum ThreadRequest {
    /// `threads = N`
    Explicit(u32),
    /// `memory_gb = X` (+ `min_threads`). Converted to threads using the
    /// memory-per-core ratio of the target node.
    Memory {
        memory_gb: f64,
        min_threads: Option<u32>,
    },
    /// Nothing declared: a whole node per process.
    NodeDefault,
}

/// Abstract resource request of a stage.
///
/// `None` fields mean "not declared"; the translator applies defaults and
/// logs that it did so.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceHint {
    pub processes: Option<u32>,
    pub threads: ThreadRequest,
    pub walltime: Option<String>,
}

impl Default for ResourceHint {
    fn default() -> Self {
        Self {
            processes: None,
            threads: ThreadRequest::NodeDefault,
            walltime: None,
        }
    }
}

impl ResourceHint {
    pub fn processes_or_default(&self) -> u32 {
        self.processes.unwrap_or(1)
    }

    pub fn walltime_or_default(&self) -> &str {
        self.walltime.as_deref().unwrap_or(DEFAULT_WALLTIME)
    }

    /// Validate a raw `parallel` table.
    ///
    /// `stage` is only used for error messages.
    pub fn from_raw(stage: &str, raw: Option<&RawParallel>) -> Result<Self> {
        let Some(raw) = raw else {
            return Ok(Self::default());
        };

        if raw.nproc == Some(0) {
            return Err(BatchdagError::config(format!(
                "stage '{stage}': parallel.nproc must be >= 1 (got 0)"
            )));
        }

        let threads = match (raw.threads, raw.memory_gb) {
            (Some(_), Some(_)) => {
                return Err(BatchdagError::config(format!(
                    "stage '{stage}': parallel.memory_gb and parallel.threads are mutually exclusive"
                )));
            }
            (Some(0), None) => {
                return Err(BatchdagError::config(format!(
                    "stage '{stage}': parallel.threads must be >= 1 (got 0)"
                )));
            }
            (Some(t), None) => ThreadRequest::Explicit(t),
            (None, Some(mem)) if !(mem > 0.0) => {
                return Err(BatchdagError::config(format!(
                    "stage '{stage}': parallel.memory_gb must be positive (got {mem})"
                )));
            }
            (None, Some(mem)) => ThreadRequest::Memory {
                memory_gb: mem,
                min_threads: raw.min_threads,
            },
            (None, None) => ThreadRequest::NodeDefault,
        };

        Ok(Self {
            processes: raw.nproc,
            threads,
            walltime: raw.walltime.clone(),
        })
    }
}
