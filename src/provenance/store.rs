// src/provenance/store.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::Regex;
use tracing::{debug, warn};

use crate::errors::{BatchdagError, Result};
use crate::fs::FileSystem;
use crate::provenance::layout::{ATTEMPT_SUFFIX, ProjectLayout};
use crate::provenance::record::ProvenanceRecord;

/// Content of a local completion marker.
pub const COMPLETED_MARKER: &str = "COMPLETED";

/// Reads and writes everything the orchestrator keeps under the project
/// directory.
#[derive(Debug, Clone)]
pub struct ProvenanceStore {
    fs: Arc<dyn FileSystem>,
    layout: ProjectLayout,
}

impl ProvenanceStore {
    pub fn new(fs: Arc<dyn FileSystem>, layout: ProjectLayout) -> Self {
        Self { fs, layout }
    }

    pub fn layout(&self) -> &ProjectLayout {
        &self.layout
    }

    pub fn fs(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    /// Load the record of one attempt.
    ///
    /// Any failure comes back as [`BatchdagError::ProvenanceRead`].
    pub fn load(&self, stage: &str, job_id: &str) -> Result<ProvenanceRecord> {
        let path = self.layout.record_path(stage, job_id);
        let read_err = |reason: String| BatchdagError::ProvenanceRead {
            stage: stage.to_string(),
            path: path.clone(),
            reason,
        };

        let text = self
            .fs
            .read_to_string(&path)
            .map_err(|e| read_err(format!("{e:#}")))?;
        let record: ProvenanceRecord =
            toml::from_str(&text).map_err(|e| read_err(e.to_string()))?;

        if record.stage != stage || record.job_id != job_id {
            return Err(read_err(format!(
                "record belongs to stage '{}' job {}",
                record.stage, record.job_id
            )));
        }
        Ok(record)
    }

    /// Persist a new record. Existing records are never overwritten.
    pub fn save(&self, record: &ProvenanceRecord) -> Result<PathBuf> {
        let path = self.layout.record_path(&record.stage, &record.job_id);
        let text = toml::to_string(record)?;
        if !self.fs.write_new(&path, text.as_bytes())? {
            return Err(BatchdagError::InternalInvariant(format!(
                "provenance record {path:?} already exists"
            )));
        }
        debug!(stage = %record.stage, job_id = %record.job_id, path = ?path, "wrote provenance record");
        Ok(path)
    }

    /// Job id of the newest cluster output log of a stage.
    pub fn latest_cluster_attempt(&self, stage: &str, site: &str) -> Option<String> {
        let prefix = self.layout.slurm_out_prefix(stage, site);
        self.latest_attempt(&self.layout.stage_dir(stage), &prefix)
    }

    /// Job id of the newest local completion marker of a stage.
    pub fn latest_local_attempt(&self, stage: &str) -> Option<String> {
        let prefix = self.layout.local_marker_prefix(stage);
        self.latest_attempt(&self.layout.stage_dir(stage), &prefix)
    }

    /// Whether the local marker of `job_id` says the run completed.
    pub fn local_attempt_completed(&self, stage: &str, job_id: &str) -> bool {
        let path = self.layout.local_marker_file(stage, job_id);
        match self.fs.read_to_string(&path) {
            Ok(text) => text.trim() == COMPLETED_MARKER,
            Err(e) => {
                warn!(stage = %stage, path = ?path, error = %e, "cannot read local completion marker");
                false
            }
        }
    }

    pub fn write_local_marker(&self, stage: &str, job_id: &str) -> Result<PathBuf> {
        let path = self.layout.local_marker_file(stage, job_id);
        self.fs.write(&path, COMPLETED_MARKER.as_bytes())?;
        Ok(path)
    }

    /// Largest numeric job id among `<dir>/<prefix>_<jobid>.txt`.
    fn latest_attempt(&self, dir: &Path, prefix: &str) -> Option<String> {
        let names = match self.fs.file_names(dir) {
            Ok(names) => names,
            Err(e) => {
                warn!(dir = ?dir, error = %e, "cannot list stage directory");
                return None;
            }
        };

        let pattern = format!(
            r"^{}_(\d+){}$",
            regex::escape(prefix),
            regex::escape(ATTEMPT_SUFFIX)
        );
        let re = match Regex::new(&pattern) {
            Ok(re) => re,
            Err(e) => {
                warn!(error = %e, "cannot build attempt file pattern");
                return None;
            }
        };

        names
            .iter()
            .filter_map(|name| {
                let id = re.captures(name)?.get(1)?.as_str();
                id.parse::<u64>().ok().map(|n| (n, id.to_string()))
            })
            .max_by_key(|(n, _)| *n)
            .map(|(_, id)| id)
    }
}
