// src/provenance/layout.rs

//! On-disk layout of a project.
//!
//! ```text
//! <root>/<project>/<stage>/
//!     slurm_out_{stage}_{project}_{site}_{jobid}.txt
//!     local_out_{stage}_{project}_state_{jobid}.txt     (contains COMPLETED)
//!     stage_config_{jobid}.toml
//!     slurm_submission_{project}_{stage}_{site}_{ms}.sh
//! ```

use std::path::{Path, PathBuf};

/// Suffix shared by cluster logs and local completion markers.
pub const ATTEMPT_SUFFIX: &str = ".txt";

/// Path functions for one project under a root directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    root_dir: PathBuf,
    project: String,
}

impl ProjectLayout {
    pub fn new(root_dir: impl Into<PathBuf>, project: impl Into<String>) -> Self {
        Self {
            root_dir: root_dir.into(),
            project: project.into(),
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn project_dir(&self) -> PathBuf {
        self.root_dir.join(&self.project)
    }

    /// Output directory of a stage; also passed to the stage as
    /// `--output-dir`.
    pub fn stage_dir(&self, stage: &str) -> PathBuf {
        self.project_dir().join(stage)
    }

    /// File name prefix of cluster output logs (before `_{jobid}.txt`).
    pub fn slurm_out_prefix(&self, stage: &str, site: &str) -> String {
        format!("slurm_out_{stage}_{}_{site}", self.project)
    }

    /// Full path prefix handed to the batch template as `!OUT`.
    pub fn slurm_out_root(&self, stage: &str, site: &str) -> PathBuf {
        self.stage_dir(stage)
            .join(self.slurm_out_prefix(stage, site))
    }

    pub fn slurm_out_file(&self, stage: &str, site: &str, job_id: &str) -> PathBuf {
        self.stage_dir(stage).join(format!(
            "{}_{job_id}{ATTEMPT_SUFFIX}",
            self.slurm_out_prefix(stage, site)
        ))
    }

    /// File name prefix of local completion markers (before `_{jobid}.txt`).
    pub fn local_marker_prefix(&self, stage: &str) -> String {
        format!("local_out_{stage}_{}_state", self.project)
    }

    pub fn local_marker_file(&self, stage: &str, job_id: &str) -> PathBuf {
        self.stage_dir(stage).join(format!(
            "{}_{job_id}{ATTEMPT_SUFFIX}",
            self.local_marker_prefix(stage)
        ))
    }

    pub fn record_path(&self, stage: &str, job_id: &str) -> PathBuf {
        self.stage_dir(stage)
            .join(format!("stage_config_{job_id}.toml"))
    }

    pub fn script_path(&self, stage: &str, site: &str, timestamp_ms: i64) -> PathBuf {
        self.stage_dir(stage).join(format!(
            "slurm_submission_{}_{stage}_{site}_{timestamp_ms}.sh",
            self.project
        ))
    }
}
