// src/plan/mod.rs

//! Pipeline planning: sweep expansion, dependency graph and execution order.
//!
//! - [`expand`] turns declared stages into concrete [`StageSpec`]s.
//! - [`graph`] holds the [`DependencyGraph`] and the ordering algorithm.
//!
//! [`PipelinePlan`] ties both together and is what the rest of the crate
//! consumes.

pub mod expand;
pub mod graph;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::debug;

use crate::config::model::PipelineConfig;
use crate::errors::{BatchdagError, Result};
use crate::types::StageName;

pub use expand::{Expansion, StageSpec, expand, split_shell_words};
pub use graph::{DependencyGraph, ExecutionOrder};

/// Fully resolved, acyclic and ordered set of concrete stages.
#[derive(Debug, Clone)]
pub struct PipelinePlan {
    stages: HashMap<StageName, StageSpec>,
    sweeps: BTreeMap<StageName, Vec<StageName>>,
    graph: DependencyGraph,
    order: Vec<StageName>,
}

impl PipelinePlan {
    /// Expand, resolve, cycle-check and order the stages of `config`.
    pub fn build(config: &PipelineConfig) -> Result<Self> {
        let Expansion { stages, sweeps } = expand(&config.stages)?;
        let graph = DependencyGraph::from_expansion(&Expansion {
            stages: stages.clone(),
            sweeps: sweeps.clone(),
        })?;
        graph.check_acyclic()?;
        let ExecutionOrder { order, .. } = graph.execution_order()?;

        let stages: HashMap<StageName, StageSpec> =
            stages.into_iter().map(|s| (s.name.clone(), s)).collect();

        ensure_covers(&order, &stages)?;
        debug!(?order, "execution order");

        Ok(Self {
            stages,
            sweeps,
            graph,
            order,
        })
    }

    /// Stage names in execution order.
    pub fn order(&self) -> &[StageName] {
        &self.order
    }

    pub fn stage(&self, name: &str) -> Option<&StageSpec> {
        self.stages.get(name)
    }

    /// Stages in execution order.
    pub fn stages_in_order(&self) -> impl Iterator<Item = &StageSpec> {
        self.order.iter().filter_map(|n| self.stages.get(n))
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn sweeps(&self) -> &BTreeMap<StageName, Vec<StageName>> {
        &self.sweeps
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Resolve user-supplied stage names (e.g. `--skip`) to concrete stages.
    ///
    /// A sweep parent stands for all of its instances. Unknown names are a
    /// configuration error.
    pub fn resolve_names<S: AsRef<str>>(&self, names: &[S]) -> Result<BTreeSet<StageName>> {
        let mut out = BTreeSet::new();
        for name in names {
            let name = name.as_ref();
            if let Some(instances) = self.sweeps.get(name) {
                out.extend(instances.iter().cloned());
            } else if self.stages.contains_key(name) {
                out.insert(name.to_string());
            } else {
                return Err(BatchdagError::config(format!(
                    "'{name}' is not a stage of this pipeline"
                )));
            }
        }
        Ok(out)
    }
}

fn ensure_covers(order: &[StageName], stages: &HashMap<StageName, StageSpec>) -> Result<()> {
    let ordered: BTreeSet<&str> = order.iter().map(String::as_str).collect();
    if ordered.len() != order.len()
        || ordered.len() != stages.len()
        || !stages.keys().all(|k| ordered.contains(k.as_str()))
    {
        return Err(BatchdagError::InternalInvariant(format!(
            "execution order covers {} of {} stages",
            ordered.len(),
            stages.len()
        )));
    }
    Ok(())
}
