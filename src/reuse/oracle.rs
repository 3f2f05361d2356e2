// src/reuse/oracle.rs

//! Completion status of previous cluster jobs.

use std::future::Future;
use std::pin::Pin;

use anyhow::anyhow;

use crate::errors::{BatchdagError, Result};
use crate::exec::process::run_capture;

/// State string the scheduler reports for a finished, successful job step.
pub const COMPLETED_STATE: &str = "COMPLETED";

/// Answers "what states did this job end in?".
pub trait StatusOracle: Send + Sync {
    /// One entry per job step, as reported by the scheduler.
    fn job_states<'a>(
        &'a self,
        job_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>>> + Send + 'a>>;
}

/// Queries SLURM accounting through `sacct`.
#[derive(Debug, Clone, Default)]
pub struct SacctOracle;

impl StatusOracle for SacctOracle {
    fn job_states<'a>(
        &'a self,
        job_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>>> + Send + 'a>> {
        Box::pin(async move {
            let out = run_capture("sacct", &["-j", job_id, "--format=State", "--parsable2"]).await?;
            if !out.success {
                return Err(BatchdagError::Other(anyhow!(
                    "sacct exited with code {}: {}",
                    out.code,
                    out.combined()
                )));
            }
            parse_sacct_states(&out.stdout)
        })
    }
}

/// Parse `sacct --format=State --parsable2` output: a `State` header line
/// followed by one state per job step.
pub fn parse_sacct_states(output: &str) -> Result<Vec<String>> {
    let mut lines = output.lines().map(str::trim);
    match lines.next() {
        Some("State") => {}
        other => {
            return Err(BatchdagError::Other(anyhow!(
                "unexpected sacct header: {other:?}"
            )));
        }
    }
    Ok(lines
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

/// At least one step, and every step completed.
pub fn all_completed(states: &[String]) -> bool {
    !states.is_empty() && states.iter().all(|s| s == COMPLETED_STATE)
}
