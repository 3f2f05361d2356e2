// src/reuse/mod.rs

//! Reuse decision engine.
//!
//! For every stage (in execution order) decide whether a previous successful
//! run can stand in for running it again:
//!
//! 1. the newest attempt (cluster log or local marker) completed,
//! 2. its provenance record matches the current stage spec,
//! 3. the tracked environment is unchanged (unless ignored),
//! 4. no dependency is being resubmitted.

pub mod oracle;

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, info, warn};

use crate::errors::{BatchdagError, Result};
use crate::plan::{PipelinePlan, StageSpec};
use crate::provenance::{EnvSnapshot, ProvenanceRecord, ProvenanceStore, StageSnapshot};
use crate::types::{BackendKind, Decision, StageName};

pub use oracle::{COMPLETED_STATE, SacctOracle, StatusOracle, all_completed, parse_sacct_states};

/// User switches that influence decisions.
#[derive(Debug, Clone, Default)]
pub struct ReuseOptions {
    /// Submit every stage that is not skipped.
    pub no_reuse: bool,
    /// Do not compare tracked environment state.
    pub ignore_git: bool,
    /// Concrete stages forced to SKIP.
    pub skip: BTreeSet<StageName>,
}

/// Where cluster attempts are looked up.
pub struct ClusterHistory<'a> {
    /// Site name used in cluster output log names.
    pub site: &'a str,
    pub oracle: &'a dyn StatusOracle,
}

/// Decisions of one run, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecisionMap {
    order: Vec<StageName>,
    decisions: HashMap<StageName, Decision>,
}

impl DecisionMap {
    pub fn get(&self, stage: &str) -> Option<Decision> {
        self.decisions.get(stage).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Decision)> {
        self.order
            .iter()
            .filter_map(|n| self.decisions.get(n).map(|d| (n.as_str(), *d)))
    }

    pub fn count(&self, decision: Decision) -> usize {
        self.decisions.values().filter(|d| **d == decision).count()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn insert(&mut self, stage: &str, decision: Decision) {
        if self.decisions.insert(stage.to_string(), decision).is_none() {
            self.order.push(stage.to_string());
        }
    }

    fn demote(&mut self, stage: &str) {
        if let Some(d) = self.decisions.get_mut(stage) {
            *d = Decision::Submit;
        }
    }
}

/// A completed previous attempt and its record, if readable.
struct Attempt {
    job_id: String,
    origin: BackendKind,
    record: Result<ProvenanceRecord>,
}

pub struct ReuseEngine<'a> {
    store: &'a ProvenanceStore,
    cluster: Option<ClusterHistory<'a>>,
    environment: &'a EnvSnapshot,
    options: &'a ReuseOptions,
}

impl<'a> ReuseEngine<'a> {
    pub fn new(
        store: &'a ProvenanceStore,
        cluster: Option<ClusterHistory<'a>>,
        environment: &'a EnvSnapshot,
        options: &'a ReuseOptions,
    ) -> Self {
        Self {
            store,
            cluster,
            environment,
            options,
        }
    }

    /// Decide REUSE / SKIP / SUBMIT for every stage of `plan`.
    pub async fn decide(&self, plan: &PipelinePlan) -> Result<DecisionMap> {
        let mut map = DecisionMap::default();

        for name in plan.order() {
            let stage = plan.stage(name).ok_or_else(|| {
                BatchdagError::InternalInvariant(format!("stage '{name}' is ordered but unknown"))
            })?;

            let decision = if self.options.skip.contains(name) {
                Decision::Skip
            } else if self.options.no_reuse {
                Decision::Submit
            } else {
                self.evaluate(stage).await
            };
            debug!(stage = %name, decision = %decision, "initial decision");
            map.insert(name, decision);
        }

        enforce_dependency_consistency(plan, &mut map);
        ensure_partition(plan, &map)?;
        Ok(map)
    }

    async fn evaluate(&self, stage: &StageSpec) -> Decision {
        let name = stage.name.as_str();
        let attempts = self.completed_attempts(name).await;

        if attempts.is_empty() {
            info!(stage = %name, "no completed previous run found");
            return Decision::Submit;
        }

        let mut records = Vec::with_capacity(attempts.len());
        for attempt in attempts {
            match attempt.record {
                Ok(record) => records.push((attempt.origin, record)),
                Err(e) => {
                    warn!(
                        stage = %name,
                        job_id = %attempt.job_id,
                        error = %e,
                        "completed run found but its provenance is unreadable; not reusing"
                    );
                    return Decision::Submit;
                }
            }
        }

        // Newer record wins when both a cluster and a local attempt completed.
        let Some((origin, record)) = records.into_iter().max_by_key(|(_, r)| r.created_at) else {
            return Decision::Submit;
        };
        debug!(stage = %name, job_id = %record.job_id, origin = %origin, "newest completed attempt");

        if record.spec != StageSnapshot::of(stage) {
            info!(stage = %name, job_id = %record.job_id, "stage configuration changed; not reusing");
            return Decision::Submit;
        }

        if !self.options.ignore_git {
            let changed = record.environment.differences(self.environment);
            if !changed.is_empty() {
                info!(stage = %name, changed = ?changed, "tracked sources changed; not reusing");
                return Decision::Submit;
            }
        }

        info!(stage = %name, job_id = %record.job_id, "previous run can be reused");
        Decision::Reuse
    }

    async fn completed_attempts(&self, name: &str) -> Vec<Attempt> {
        let mut attempts = Vec::new();

        if let Some(cluster) = &self.cluster {
            match self.store.latest_cluster_attempt(name, cluster.site) {
                Some(job_id) => match cluster.oracle.job_states(&job_id).await {
                    Ok(states) if all_completed(&states) => {
                        let record = self.store.load(name, &job_id);
                        attempts.push(Attempt {
                            job_id,
                            origin: BackendKind::Slurm,
                            record,
                        });
                    }
                    Ok(states) => {
                        info!(stage = %name, job_id = %job_id, states = ?states, "last cluster job did not complete");
                    }
                    Err(e) => {
                        warn!(stage = %name, job_id = %job_id, error = %e, "cannot determine status of last cluster job");
                    }
                },
                None => debug!(stage = %name, "no cluster output log found"),
            }
        }

        if let Some(job_id) = self.store.latest_local_attempt(name) {
            if self.store.local_attempt_completed(name, &job_id) {
                let record = self.store.load(name, &job_id);
                attempts.push(Attempt {
                    job_id,
                    origin: BackendKind::Local,
                    record,
                });
            } else {
                info!(stage = %name, job_id = %job_id, "last local run did not complete");
            }
        }

        attempts
    }
}

/// Demote every REUSE stage that has a SUBMIT dependency.
///
/// A single pass suffices because `plan.order()` lists dependencies first.
pub fn enforce_dependency_consistency(plan: &PipelinePlan, map: &mut DecisionMap) {
    for name in plan.order() {
        if map.get(name) != Some(Decision::Reuse) {
            continue;
        }
        let resubmitted: Vec<&str> = plan
            .graph()
            .dependencies_of(name)
            .into_iter()
            .filter(|d| map.get(d) == Some(Decision::Submit))
            .collect();
        if !resubmitted.is_empty() {
            info!(
                stage = %name,
                dependencies = ?resubmitted,
                "dependencies are resubmitted; not reusing"
            );
            map.demote(name);
        }
    }
}

fn ensure_partition(plan: &PipelinePlan, map: &DecisionMap) -> Result<()> {
    let decided: BTreeSet<&str> = map.iter().map(|(n, _)| n).collect();
    let planned: BTreeSet<&str> = plan.order().iter().map(String::as_str).collect();
    if decided != planned || map.len() != plan.len() {
        return Err(BatchdagError::InternalInvariant(format!(
            "decisions cover {} stages, plan has {}",
            decided.len(),
            planned.len()
        )));
    }
    Ok(())
}
