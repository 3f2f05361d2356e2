// src/exec/local.rs

use std::future::Future;
use std::pin::Pin;

use chrono::Utc;
use tracing::info;

use crate::errors::{BatchdagError, Result};
use crate::exec::backend::{Backend, JobId, JobRequest};
use crate::exec::process::run_streaming;
use crate::provenance::ProvenanceStore;
use crate::types::BackendKind;

/// Runs each stage as a local subprocess and waits for it.
///
/// The job id is the completion time in Unix milliseconds; a `COMPLETED`
/// marker is written under that id once the process exits successfully.
pub struct LocalBackend {
    store: ProvenanceStore,
    dry_run: bool,
    next_dry_run_id: u64,
    /// Replaces the interpreter named by the stage's exec kind.
    program: Option<String>,
}

impl LocalBackend {
    pub fn new(store: ProvenanceStore, dry_run: bool) -> Self {
        Self {
            store,
            dry_run,
            next_dry_run_id: 1,
            program: None,
        }
    }

    /// Run every stage with `program` instead of `python`/`python3`, e.g. the
    /// interpreter of a virtualenv.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = Some(program.into());
        self
    }

    fn argv(&self, job: &JobRequest) -> Vec<String> {
        let mut argv = job.argv();
        if let (Some(program), Some(first)) = (&self.program, argv.first_mut()) {
            *first = program.clone();
        }
        argv
    }

    async fn run(&mut self, job: JobRequest) -> Result<JobId> {
        let name = job.stage.name.clone();

        if self.dry_run {
            println!("{}", job.command_line());
            let id = self.next_dry_run_id.to_string();
            self.next_dry_run_id += 1;
            return Ok(id);
        }

        let out = run_streaming(&name, &self.argv(&job))
            .await
            .map_err(|e| BatchdagError::Backend {
                stage: name.clone(),
                output: format!("{e:#}"),
            })?;

        if !out.success {
            return Err(BatchdagError::Backend {
                stage: name,
                output: format!("exit code {}\n{}", out.code, out.stderr.trim_end()),
            });
        }

        let job_id = Utc::now().timestamp_millis().to_string();
        let marker = self.store.write_local_marker(&name, &job_id)?;
        info!(stage = %name, job_id = %job_id, marker = ?marker, "local stage completed");
        Ok(job_id)
    }
}

impl Backend for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn supports_dependencies(&self) -> bool {
        false
    }

    fn submit(
        &mut self,
        job: JobRequest,
    ) -> Pin<Box<dyn Future<Output = Result<JobId>> + Send + '_>> {
        Box::pin(self.run(job))
    }
}
