// src/exec/slurm.rs

//! SLURM backend: render the site's batch template, write it next to the
//! stage output and hand it to `sbatch --parsable`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::config::site::SiteProfile;
use crate::errors::{BatchdagError, Result};
use crate::exec::backend::{Backend, JobId, JobRequest};
use crate::exec::process::run_capture;
use crate::fs::FileSystem;
use crate::provenance::ProjectLayout;
use crate::resources::ScriptValues;
use crate::types::BackendKind;

pub struct SlurmBackend {
    site: SiteProfile,
    project: ProjectLayout,
    fs: Arc<dyn FileSystem>,
    dry_run: bool,
    next_dry_run_id: u64,
}

impl SlurmBackend {
    pub fn new(
        site: SiteProfile,
        project: ProjectLayout,
        fs: Arc<dyn FileSystem>,
        dry_run: bool,
    ) -> Self {
        Self {
            site,
            project,
            fs,
            dry_run,
            next_dry_run_id: 1,
        }
    }

    pub fn site(&self) -> &SiteProfile {
        &self.site
    }

    /// Render the batch script for one request.
    pub fn render_script(&self, job: &JobRequest) -> Result<String> {
        let name = &job.stage.name;
        let layout = job.layout.as_ref().ok_or_else(|| {
            BatchdagError::InternalInvariant(format!(
                "stage '{name}' reached the SLURM backend without a resource layout"
            ))
        })?;

        let job_name = format!("{name}_{}", self.project.project());
        let out_root = self
            .project
            .slurm_out_root(name, &self.site.name)
            .display()
            .to_string();
        let command = job.command_line();

        Ok(self.site.template.render(&ScriptValues {
            job_name: &job_name,
            command: &command,
            out_file_root: &out_root,
            layout,
            account: self.site.account.as_deref(),
            constraint: self.site.constraint.as_deref(),
            qos: self.site.qos.as_deref(),
            partition: self.site.partition.as_deref(),
        }))
    }

    async fn submit_inner(&mut self, job: JobRequest) -> Result<JobId> {
        let name = job.stage.name.clone();
        let script = self.render_script(&job)?;
        let script_path =
            self.project
                .script_path(&name, &self.site.name, Utc::now().timestamp_millis());
        let script_arg = script_path.display().to_string();

        let mut args: Vec<&str> = vec!["--parsable"];
        if let Some(dep) = job.dependency.as_deref() {
            args.push(dep);
        }
        args.push(&script_arg);

        if self.dry_run {
            let title = format!("{name}_{}", self.project.project());
            println!("{title}");
            println!("{}", "=".repeat(title.len()));
            println!("{script}");
            println!("sbatch {}", args.join(" "));
            println!();
            let id = self.next_dry_run_id.to_string();
            self.next_dry_run_id += 1;
            return Ok(id);
        }

        self.fs.write(&script_path, script.as_bytes())?;
        debug!(stage = %name, path = ?script_path, "wrote batch script");

        let out = run_capture("sbatch", &args)
            .await
            .map_err(|e| BatchdagError::Backend {
                stage: name.clone(),
                output: format!("{e:#}"),
            })?;

        if !out.success {
            return Err(BatchdagError::Backend {
                stage: name,
                output: out.combined(),
            });
        }

        let id = parse_sbatch_job_id(&out.stdout).ok_or_else(|| BatchdagError::Backend {
            stage: name.clone(),
            output: format!("unexpected sbatch output: {:?}", out.stdout),
        })?;

        info!(stage = %name, job_id = %id, "submitted batch job");
        Ok(id)
    }
}

impl Backend for SlurmBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Slurm
    }

    fn supports_dependencies(&self) -> bool {
        true
    }

    fn submit(
        &mut self,
        job: JobRequest,
    ) -> Pin<Box<dyn Future<Output = Result<JobId>> + Send + '_>> {
        Box::pin(self.submit_inner(job))
    }
}

/// `sbatch --parsable` prints `jobid` or `jobid;cluster`.
pub fn parse_sbatch_job_id(stdout: &str) -> Option<String> {
    let line = stdout.lines().map(str::trim).find(|l| !l.is_empty())?;
    let id = line.split(';').next()?.trim();
    (!id.is_empty() && id.chars().all(|c| c.is_ascii_digit())).then(|| id.to_string())
}

/// Whether `sbatch` can be spawned on this machine.
pub async fn slurm_available() -> bool {
    match run_capture("sbatch", &["-V"]).await {
        Ok(out) => {
            debug!(version = %out.stdout.trim(), "found sbatch");
            true
        }
        Err(_) => false,
    }
}
