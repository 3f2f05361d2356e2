// src/exec/backend.rs

//! Pluggable execution backend abstraction.
//!
//! The dispatcher talks to a `Backend` instead of calling `sbatch` or
//! spawning processes itself. Production code uses
//! [`SlurmBackend`](super::SlurmBackend) or
//! [`LocalBackend`](super::LocalBackend); tests provide a fake that records
//! requests and hands out job ids.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use crate::errors::Result;
use crate::plan::StageSpec;
use crate::resources::ResourceLayout;
use crate::types::BackendKind;

/// Backend job identifier (SLURM job id or local millisecond timestamp).
pub type JobId = String;

/// Everything a backend needs to start one stage.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub stage: StageSpec,
    /// Directory passed to the stage as `--output-dir`; already created.
    pub output_dir: PathBuf,
    /// Present whenever the backend needs a node layout.
    pub layout: Option<ResourceLayout>,
    /// e.g. `--dependency=afterok:123:456`
    pub dependency: Option<String>,
}

impl JobRequest {
    /// Stage invocation as an argv.
    pub fn argv(&self) -> Vec<String> {
        self.stage.argv(&self.output_dir)
    }

    /// Stage invocation as a single shell-quoted line.
    pub fn command_line(&self) -> String {
        self.stage.command_line(&self.output_dir)
    }
}

/// Trait abstracting where stages run.
pub trait Backend: Send {
    fn kind(&self) -> BackendKind;

    /// Whether dependency clauses are understood. Sequential local execution
    /// already respects order and needs none.
    fn supports_dependencies(&self) -> bool;

    /// Submit (or run) one stage and return its job id.
    ///
    /// For a batch scheduler this returns as soon as the job is queued; for
    /// local execution it returns after the process finished successfully.
    fn submit(
        &mut self,
        job: JobRequest,
    ) -> Pin<Box<dyn Future<Output = Result<JobId>> + Send + '_>>;
}
