// src/dispatch/mod.rs

//! Submission dispatcher.
//!
//! Walks the plan in execution order. REUSE and SKIP stages only produce
//! advisories; SUBMIT stages go to the backend with a dependency clause built
//! from the job ids of dependencies submitted in this run.
//!
//! Per stage:
//!
//! ```text
//! pending -> reused | skipped
//! pending -> layout-resolved -> backend-invoked -> provenance-recorded | failed
//! ```

pub mod summary;

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::{info, warn};

use crate::config::site::NodeHardware;
use crate::errors::{BatchdagError, Result};
use crate::exec::{Backend, JobId, JobRequest};
use crate::plan::{PipelinePlan, StageSpec};
use crate::provenance::{EnvSnapshot, ProvenanceRecord, ProvenanceStore};
use crate::resources::{ResourceLayout, translate};
use crate::reuse::DecisionMap;
use crate::types::{Decision, StageName};

pub use summary::{AssumeYes, ConfirmPrompt, LinePrompt, parse_answer, render_summary};

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(DispatchReport),
    /// The operator declined at the confirmation prompt; nothing was touched.
    Aborted,
}

/// What the dispatcher did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Job id per submitted stage.
    pub job_ids: BTreeMap<StageName, JobId>,
    /// Submitted stages in submission order.
    pub submitted: Vec<StageName>,
    /// Provenance records written (empty in dry-run).
    pub records: Vec<PathBuf>,
}

/// `--dependency=afterok:<id>:<id>`, or nothing for an empty list.
pub fn dependency_clause(job_ids: &[&str]) -> Option<String> {
    if job_ids.is_empty() {
        None
    } else {
        Some(format!("--dependency=afterok:{}", job_ids.join(":")))
    }
}

/// Resolve the layout of every SUBMIT stage up front, so a bad resource hint
/// fails the run before anything is submitted.
pub fn resolve_layouts(
    plan: &PipelinePlan,
    decisions: &DecisionMap,
    hardware: &NodeHardware,
) -> Result<BTreeMap<StageName, ResourceLayout>> {
    let mut layouts = BTreeMap::new();
    for stage in plan.stages_in_order() {
        if decisions.get(&stage.name) == Some(Decision::Submit) {
            let layout = translate(&stage.name, &stage.resources, hardware)?;
            layouts.insert(stage.name.clone(), layout);
        }
    }
    Ok(layouts)
}

pub struct Dispatcher<'a> {
    backend: &'a mut dyn Backend,
    store: &'a ProvenanceStore,
    /// Node hardware, when the backend needs layouts.
    hardware: Option<NodeHardware>,
    environment: &'a EnvSnapshot,
    dry_run: bool,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        backend: &'a mut dyn Backend,
        store: &'a ProvenanceStore,
        hardware: Option<NodeHardware>,
        environment: &'a EnvSnapshot,
        dry_run: bool,
    ) -> Self {
        Self {
            backend,
            store,
            hardware,
            environment,
            dry_run,
        }
    }

    pub async fn run(self, plan: &PipelinePlan, decisions: &DecisionMap) -> Result<DispatchReport> {
        let Dispatcher {
            backend,
            store,
            hardware,
            environment,
            dry_run,
        } = self;

        let mut layouts = match &hardware {
            Some(hw) => resolve_layouts(plan, decisions, hw)?,
            None => BTreeMap::new(),
        };

        if !dry_run {
            store.fs().create_dir_all(&store.layout().project_dir())?;
        }

        let mut report = DispatchReport::default();

        for stage in plan.stages_in_order() {
            let name = stage.name.as_str();
            let decision = decisions.get(name).ok_or_else(|| {
                BatchdagError::InternalInvariant(format!("no decision for stage '{name}'"))
            })?;

            match decision {
                Decision::Skip => {
                    warn!(stage = %name, "skipping stage as requested");
                    if plan.graph().has_dependents(name) {
                        warn!(stage = %name, dependents = ?plan.graph().dependents_of(name), "skipped stage is depended on by others");
                    }
                }
                Decision::Reuse => {
                    warn!(stage = %name, "reusing previous result of stage");
                    if plan.graph().has_dependents(name) {
                        warn!(stage = %name, dependents = ?plan.graph().dependents_of(name), "reused stage is depended on by others");
                    }
                }
                Decision::Submit => {
                    let layout = layouts.remove(name);
                    let job_id = submit_stage(
                        &mut *backend,
                        store,
                        plan,
                        decisions,
                        &report.job_ids,
                        stage,
                        layout,
                        dry_run,
                    )
                    .await?;

                    if !dry_run {
                        let record =
                            ProvenanceRecord::new(stage, &job_id, backend.kind(), environment.clone())?;
                        report.records.push(store.save(&record)?);
                    }

                    report.submitted.push(name.to_string());
                    report.job_ids.insert(name.to_string(), job_id);
                }
            }
        }

        info!(
            submitted = report.submitted.len(),
            reused = decisions.count(Decision::Reuse),
            skipped = decisions.count(Decision::Skip),
            dry_run,
            "dispatch finished"
        );
        Ok(report)
    }
}

#[allow(clippy::too_many_arguments)]
async fn submit_stage(
    backend: &mut dyn Backend,
    store: &ProvenanceStore,
    plan: &PipelinePlan,
    decisions: &DecisionMap,
    job_ids: &BTreeMap<StageName, JobId>,
    stage: &StageSpec,
    layout: Option<ResourceLayout>,
    dry_run: bool,
) -> Result<JobId> {
    let name = stage.name.as_str();

    let mut upstream: Vec<&str> = Vec::new();
    for dep in plan.graph().dependencies_of(name) {
        if decisions.get(dep) != Some(Decision::Submit) {
            continue;
        }
        let id = job_ids.get(dep).ok_or_else(|| {
            BatchdagError::InternalInvariant(format!(
                "dependency '{dep}' of stage '{name}' has no job id"
            ))
        })?;
        upstream.push(id.as_str());
    }

    let dependency = if backend.supports_dependencies() {
        dependency_clause(&upstream)
    } else {
        None
    };

    let output_dir = store.layout().stage_dir(name);
    if !dry_run {
        store.fs().create_dir_all(&output_dir)?;
    }

    info!(stage = %name, dependency = ?dependency, "submitting stage");
    let job_id = backend
        .submit(JobRequest {
            stage: stage.clone(),
            output_dir,
            layout,
            dependency,
        })
        .await?;
    info!(stage = %name, job_id = %job_id, "stage submitted");
    Ok(job_id)
}
