use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use batchdag::config::TrackedEntry;
use batchdag::errors::{BatchdagError, Result};
use batchdag::exec::{Backend, JobId, JobRequest};
use batchdag::provenance::{COMPLETED_MARKER, ProvenanceStore, TrackedVersion, VersionProbe};
use batchdag::reuse::{COMPLETED_STATE, StatusOracle};
use batchdag::types::BackendKind;

/// Files a fake backend leaves behind, the way a real one would.
#[derive(Clone)]
enum Traces {
    None,
    /// Empty `slurm_out_..._{jobid}.txt` log, like SLURM at job start.
    ClusterLog { store: ProvenanceStore, site: String },
    /// `local_out_..._state_{jobid}.txt` containing COMPLETED.
    LocalMarker { store: ProvenanceStore },
}

/// A fake backend that:
/// - records every request it receives
/// - hands out increasing numeric job ids starting at 1000
/// - optionally fails for one stage
/// - optionally leaves cluster logs / local markers behind.
///
/// Clones share the request log and id counter.
#[derive(Clone)]
pub struct FakeBackend {
    kind: BackendKind,
    requests: Arc<Mutex<Vec<JobRequest>>>,
    next_id: Arc<Mutex<u64>>,
    fail_stage: Option<String>,
    traces: Traces,
}

impl FakeBackend {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            requests: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(Mutex::new(1000)),
            fail_stage: None,
            traces: Traces::None,
        }
    }

    pub fn slurm() -> Self {
        Self::new(BackendKind::Slurm)
    }

    pub fn local() -> Self {
        Self::new(BackendKind::Local)
    }

    pub fn failing_on(mut self, stage: &str) -> Self {
        self.fail_stage = Some(stage.to_string());
        self
    }

    pub fn writing_cluster_logs(mut self, store: ProvenanceStore, site: &str) -> Self {
        self.traces = Traces::ClusterLog {
            store,
            site: site.to_string(),
        };
        self
    }

    pub fn writing_local_markers(mut self, store: ProvenanceStore) -> Self {
        self.traces = Traces::LocalMarker { store };
        self
    }

    pub fn requests(&self) -> Vec<JobRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn submitted_stages(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .map(|r| r.stage.name)
            .collect()
    }

    pub fn clear(&self) {
        self.requests.lock().unwrap().clear();
    }
}

impl Backend for FakeBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn supports_dependencies(&self) -> bool {
        self.kind == BackendKind::Slurm
    }

    fn submit(
        &mut self,
        job: JobRequest,
    ) -> Pin<Box<dyn Future<Output = Result<JobId>> + Send + '_>> {
        Box::pin(async move {
            let name = job.stage.name.clone();
            self.requests.lock().unwrap().push(job);

            if self.fail_stage.as_deref() == Some(name.as_str()) {
                return Err(BatchdagError::Backend {
                    stage: name,
                    output: "fake backend failure".to_string(),
                });
            }

            let id = {
                let mut next = self.next_id.lock().unwrap();
                let id = next.to_string();
                *next += 1;
                id
            };

            match &self.traces {
                Traces::None => {}
                Traces::ClusterLog { store, site } => {
                    let path = store.layout().slurm_out_file(&name, site, &id);
                    store.fs().write(&path, b"")?;
                }
                Traces::LocalMarker { store } => {
                    let path = store.layout().local_marker_file(&name, &id);
                    store.fs().write(&path, COMPLETED_MARKER.as_bytes())?;
                }
            }

            Ok(id)
        })
    }
}

/// Status oracle answering from a table, with a default for unknown jobs.
#[derive(Clone, Default)]
pub struct FakeStatusOracle {
    states: Arc<Mutex<HashMap<String, Vec<String>>>>,
    default: Option<Vec<String>>,
    fail: bool,
}

impl FakeStatusOracle {
    /// Every job reports a single COMPLETED step.
    pub fn all_completed() -> Self {
        Self {
            default: Some(vec![COMPLETED_STATE.to_string()]),
            ..Self::default()
        }
    }

    /// Every query fails, like an unreachable accounting database.
    pub fn unavailable() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn set(&self, job_id: &str, states: &[&str]) {
        self.states.lock().unwrap().insert(
            job_id.to_string(),
            states.iter().map(|s| s.to_string()).collect(),
        );
    }
}

impl StatusOracle for FakeStatusOracle {
    fn job_states<'a>(
        &'a self,
        job_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>>> + Send + 'a>> {
        Box::pin(async move {
            if self.fail {
                return Err(BatchdagError::Other(anyhow!("sacct unavailable")));
            }
            let known = self.states.lock().unwrap().get(job_id).cloned();
            Ok(known.or_else(|| self.default.clone()).unwrap_or_default())
        })
    }
}

/// Version probe answering from a table keyed by tracked entry key.
///
/// Unknown entries report a clean checkout at revision `0000000`.
#[derive(Clone, Default)]
pub struct FakeProbe {
    versions: Arc<Mutex<HashMap<String, TrackedVersion>>>,
}

impl FakeProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_revision(&self, key: &str, revision: &str, dirty: bool) {
        self.versions.lock().unwrap().insert(
            key.to_string(),
            TrackedVersion {
                revision: Some(revision.to_string()),
                dirty,
                branch: Some("main".to_string()),
                version: None,
            },
        );
    }
}

impl VersionProbe for FakeProbe {
    fn probe<'a>(
        &'a self,
        entry: &'a TrackedEntry,
    ) -> Pin<Box<dyn Future<Output = Result<TrackedVersion>> + Send + 'a>> {
        Box::pin(async move {
            let known = self.versions.lock().unwrap().get(&entry.key()).cloned();
            Ok(known.unwrap_or_else(|| TrackedVersion {
                revision: Some("0000000".to_string()),
                ..TrackedVersion::default()
            }))
        })
    }
}
