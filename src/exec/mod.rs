// src/exec/mod.rs

//! Execution layer.
//!
//! - [`backend`] provides the `Backend` trait the dispatcher talks to.
//! - [`slurm`] submits rendered batch scripts with `sbatch`.
//! - [`local`] runs stages one after another as subprocesses.
//! - [`process`] wraps `tokio::process::Command`.

pub mod backend;
pub mod local;
pub mod process;
pub mod slurm;

pub use backend::{Backend, JobId, JobRequest};
pub use local::LocalBackend;
pub use process::{ProcessOutput, run_capture, run_streaming};
pub use slurm::{SlurmBackend, parse_sbatch_job_id, slurm_available};
