// src/resources/layout.rs

//! Translation of resource hints into a concrete node/task/thread layout.

use tracing::{debug, warn};

use crate::config::site::NodeHardware;
use crate::errors::{BatchdagError, Result};
use crate::resources::hint::{ResourceHint, ThreadRequest};

/// Below this node utilization (in percent) an advisory is logged.
pub const UTILIZATION_ADVISORY_PCT: f64 = 90.0;

/// Hyperthreading factor assumed when the site does not declare one.
pub const DEFAULT_THREADS_PER_CORE: u32 = 2;

/// Where the per-process thread count came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadSource {
    Explicit,
    FromMemory,
    /// Nothing declared; one whole node per process.
    NodeDefault,
}

/// Concrete layout handed to the backend. Created fresh per submission.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceLayout {
    pub processes: u32,
    pub threads: u32,
    pub nodes: u32,
    pub tasks_per_node: u32,
    pub total_cores: u32,
    pub cores_per_node: u32,
    /// `total_cores * 100 / (nodes * cores_per_node)`
    pub utilization_pct: f64,
    pub threads_per_core: u32,
    pub walltime: String,
    pub thread_source: ThreadSource,
}

impl ResourceLayout {
    pub fn is_underutilized(&self) -> bool {
        self.utilization_pct < UTILIZATION_ADVISORY_PCT
    }

    /// Logical CPUs per task once hyperthreading is accounted for.
    pub fn hyperthreads(&self) -> u32 {
        self.threads.saturating_mul(self.threads_per_core)
    }
}

/// Convert a memory budget into a per-process thread count.
///
/// `ceil(cores_per_node / memory_per_node_gb * memory_gb)`, raised to
/// `min_threads`, then rounded up to an even number so hyperthread pairs are
/// not split.
///
/// `None` when the result does not fit a `u32`.
pub fn threads_for_memory(
    cores_per_node: u32,
    memory_per_node_gb: f64,
    memory_gb: f64,
    min_threads: u32,
) -> Option<u32> {
    let raw = (f64::from(cores_per_node) / memory_per_node_gb * memory_gb).ceil();
    if !raw.is_finite() || raw > f64::from(u32::MAX) {
        return None;
    }
    let threads = (raw.max(0.0) as u32).max(min_threads);
    threads.checked_add(threads % 2)
}

/// Resolve `hint` against the hardware of the target partition.
///
/// Fails only on configuration problems; utilization advisories are logged
/// and never block submission.
pub fn translate(stage: &str, hint: &ResourceHint, hw: &NodeHardware) -> Result<ResourceLayout> {
    let cpn = hw.cores_per_node;
    if cpn == 0 {
        return Err(BatchdagError::config(format!(
            "site hardware for stage '{stage}' declares cores_per_node = 0"
        )));
    }

    if hint.processes.is_none() {
        debug!(stage = %stage, "no parallel.nproc; assuming a single process");
    }
    let processes = hint.processes_or_default();

    let (threads, thread_source) = match &hint.threads {
        ThreadRequest::Memory {
            memory_gb,
            min_threads,
        } => {
            let Some(mem_per_node) = hw.memory_per_node_gb else {
                return Err(BatchdagError::config(format!(
                    "stage '{stage}' uses parallel.memory_gb but the site has no memory_per_node_gb"
                )));
            };
            let Some(min_threads) = *min_threads else {
                return Err(BatchdagError::config(format!(
                    "stage '{stage}' uses parallel.memory_gb and therefore needs parallel.min_threads"
                )));
            };
            let threads = threads_for_memory(cpn, mem_per_node, *memory_gb, min_threads)
                .ok_or_else(|| {
                    BatchdagError::config(format!(
                        "stage '{stage}': parallel.memory_gb = {memory_gb} needs more threads than can be requested"
                    ))
                })?;
            warn!(
                stage = %stage,
                memory_gb = *memory_gb,
                threads,
                "converted memory request to thread count"
            );
            (threads, ThreadSource::FromMemory)
        }
        ThreadRequest::Explicit(t) => (*t, ThreadSource::Explicit),
        ThreadRequest::NodeDefault => {
            warn!(
                stage = %stage,
                threads = cpn,
                "no parallel.threads or parallel.memory_gb; using one whole node per process"
            );
            (cpn, ThreadSource::NodeDefault)
        }
    };

    let walltime = match &hint.walltime {
        Some(w) => w.clone(),
        None => {
            let w = hint.walltime_or_default().to_string();
            warn!(stage = %stage, walltime = %w, "no parallel.walltime; using default");
            w
        }
    };

    let threads_per_core = match hw.threads_per_core {
        Some(tpc) => tpc,
        None => {
            warn!(
                stage = %stage,
                "site does not declare threads_per_core; assuming hyperthreading factor {}",
                DEFAULT_THREADS_PER_CORE
            );
            DEFAULT_THREADS_PER_CORE
        }
    };

    if threads == 0 {
        return Err(BatchdagError::config(format!(
            "stage '{stage}' resolves to zero threads per process"
        )));
    }
    let too_large = || {
        BatchdagError::config(format!(
            "stage '{stage}': {processes} processes x {threads} threads is too large to lay out"
        ))
    };
    let total_cores = processes.checked_mul(threads).ok_or_else(too_large)?;
    threads.checked_mul(threads_per_core).ok_or_else(too_large)?;
    let nodes = total_cores.div_ceil(cpn);
    let tasks_per_node = processes / nodes;
    let utilization_pct = f64::from(total_cores) * 100.0 / (f64::from(nodes) * f64::from(cpn));

    let layout = ResourceLayout {
        processes,
        threads,
        nodes,
        tasks_per_node,
        total_cores,
        cores_per_node: cpn,
        utilization_pct,
        threads_per_core,
        walltime,
        thread_source,
    };

    if layout.is_underutilized() {
        warn!(
            stage = %stage,
            processes,
            threads,
            nodes,
            utilization_pct,
            "nodes will have less than 90% of their cores in use; reconsider the process/thread split"
        );
    }

    debug!(stage = %stage, ?layout, "resolved resource layout");
    Ok(layout)
}
