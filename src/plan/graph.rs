// src/plan/graph.rs

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::{debug, warn};

use crate::errors::{BatchdagError, Result};
use crate::plan::expand::Expansion;
use crate::types::StageName;

/// Dependency graph over concrete stages.
///
/// Nodes are addressed by stable `petgraph` indices; names are only used at
/// the edges of the API.
///
/// Edge direction: dep -> stage. For
///
/// ```toml
/// [stage.B]
/// depends = ["A"]
/// ```
///
/// we add edge A -> B.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    graph: DiGraph<StageName, ()>,
    index: HashMap<StageName, NodeIndex>,
    /// Stage names in declaration order.
    declared: Vec<StageName>,
}

/// Execution order plus the stages that were appended because they are not
/// connected to anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOrder {
    pub order: Vec<StageName>,
    pub isolated: Vec<StageName>,
}

impl DependencyGraph {
    /// Build a graph from stage names (in declaration order) and a map of
    /// already-resolved dependencies.
    ///
    /// Every dependency must name one of `stages`.
    pub fn new(stages: &[StageName], deps: &BTreeMap<StageName, Vec<StageName>>) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();

        for name in stages {
            if index.contains_key(name) {
                return Err(BatchdagError::config(format!(
                    "stage '{name}' is declared more than once"
                )));
            }
            let idx = graph.add_node(name.clone());
            index.insert(name.clone(), idx);
        }

        for (name, stage_deps) in deps {
            let Some(&to) = index.get(name) else {
                return Err(BatchdagError::config(format!(
                    "dependencies given for unknown stage '{name}'"
                )));
            };
            for dep in stage_deps {
                let Some(&from) = index.get(dep) else {
                    return Err(BatchdagError::config(format!(
                        "stage '{name}' depends on '{dep}', which is not defined"
                    )));
                };
                graph.update_edge(from, to, ());
            }
        }

        Ok(Self {
            graph,
            index,
            declared: stages.to_vec(),
        })
    }

    /// Build the graph for expanded stages, resolving dependencies on sweep
    /// parents to all of the parent's instances.
    pub fn from_expansion(expansion: &Expansion) -> Result<Self> {
        let names: Vec<StageName> = expansion.stages.iter().map(|s| s.name.clone()).collect();
        let known: HashSet<&str> = names.iter().map(String::as_str).collect();

        let mut deps: BTreeMap<StageName, Vec<StageName>> = BTreeMap::new();
        for stage in &expansion.stages {
            if stage.depends.is_empty() {
                continue;
            }
            let mut resolved: Vec<StageName> = Vec::new();
            for dep in &stage.depends {
                if let Some(instances) = expansion.sweeps.get(dep) {
                    for inst in instances {
                        if !resolved.contains(inst) {
                            resolved.push(inst.clone());
                        }
                    }
                } else if known.contains(dep.as_str()) {
                    if !resolved.contains(dep) {
                        resolved.push(dep.clone());
                    }
                } else {
                    return Err(BatchdagError::config(format!(
                        "stage '{}' depends on '{dep}', which is not defined in the configuration",
                        stage.name
                    )));
                }
            }
            deps.insert(stage.name.clone(), resolved);
        }

        Self::new(&names, &deps)
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Stage names in declaration order.
    pub fn stages(&self) -> impl Iterator<Item = &str> {
        self.declared.iter().map(String::as_str)
    }

    /// Immediate dependencies of a stage, sorted by name.
    pub fn dependencies_of(&self, name: &str) -> Vec<&str> {
        self.neighbours(name, Direction::Incoming)
    }

    /// Immediate dependents of a stage, sorted by name.
    pub fn dependents_of(&self, name: &str) -> Vec<&str> {
        self.neighbours(name, Direction::Outgoing)
    }

    pub fn has_dependents(&self, name: &str) -> bool {
        self.index.get(name).is_some_and(|&idx| {
            self.graph
                .neighbors_directed(idx, Direction::Outgoing)
                .next()
                .is_some()
        })
    }

    fn neighbours(&self, name: &str, dir: Direction) -> Vec<&str> {
        let Some(&idx) = self.index.get(name) else {
            return Vec::new();
        };
        let mut out: Vec<&str> = self
            .graph
            .neighbors_directed(idx, dir)
            .map(|n| self.graph[n].as_str())
            .collect();
        out.sort_unstable();
        out
    }

    /// Reject any dependency cycle, self-dependencies included.
    ///
    /// Depth-first search from every node along dependency edges, keeping the
    /// current path; reaching a node that is already on the path is a cycle.
    pub fn check_acyclic(&self) -> Result<()> {
        let mut done: HashSet<NodeIndex> = HashSet::new();

        for start in self.graph.node_indices() {
            if done.contains(&start) {
                continue;
            }
            let mut path: Vec<NodeIndex> = Vec::new();
            if let Some(cycle) = self.find_cycle(start, &mut path, &mut done) {
                let names: Vec<&str> = cycle.iter().map(|&i| self.graph[i].as_str()).collect();
                return Err(BatchdagError::DagCycle(format!(
                    "circular dependency detected: {}",
                    names.join(" -> ")
                )));
            }
        }
        Ok(())
    }

    fn find_cycle(
        &self,
        node: NodeIndex,
        path: &mut Vec<NodeIndex>,
        done: &mut HashSet<NodeIndex>,
    ) -> Option<Vec<NodeIndex>> {
        if let Some(pos) = path.iter().position(|&n| n == node) {
            let mut cycle = path[pos..].to_vec();
            cycle.push(node);
            return Some(cycle);
        }
        if done.contains(&node) {
            return None;
        }

        path.push(node);
        for dep in self.graph.neighbors_directed(node, Direction::Incoming) {
            if let Some(cycle) = self.find_cycle(dep, path, done) {
                return Some(cycle);
            }
        }
        path.pop();
        done.insert(node);
        None
    }

    /// Deterministic execution order.
    ///
    /// Stages that take part in at least one dependency edge are levelled by
    /// their longest distance from a root (`level = 1 + max(level of deps)`,
    /// roots at 0), emitted by increasing level and by name within a level.
    /// Stages without any edge follow in declaration order, each with a
    /// warning.
    ///
    /// Callers must run [`check_acyclic`](Self::check_acyclic) first.
    pub fn execution_order(&self) -> Result<ExecutionOrder> {
        let g = &self.graph;
        let mut level: HashMap<NodeIndex, usize> = HashMap::new();
        let mut indegree: HashMap<NodeIndex, usize> = g
            .node_indices()
            .map(|n| (n, g.neighbors_directed(n, Direction::Incoming).count()))
            .collect();

        let mut queue: VecDeque<NodeIndex> = g
            .node_indices()
            .filter(|n| indegree[n] == 0)
            .collect();
        for &root in &queue {
            level.insert(root, 0);
        }

        let mut visited = 0usize;
        while let Some(n) = queue.pop_front() {
            visited += 1;
            let next_level = level[&n] + 1;
            for dependent in g.neighbors_directed(n, Direction::Outgoing) {
                let entry = level.entry(dependent).or_insert(0);
                *entry = (*entry).max(next_level);
                if let Some(d) = indegree.get_mut(&dependent) {
                    *d -= 1;
                    if *d == 0 {
                        queue.push_back(dependent);
                    }
                }
            }
        }

        if visited != g.node_count() {
            return Err(BatchdagError::DagCycle(
                "circular dependency detected while ordering stages".to_string(),
            ));
        }

        let mut by_level: BTreeMap<usize, Vec<&str>> = BTreeMap::new();
        let mut isolated = Vec::new();
        for name in &self.declared {
            let idx = self.index[name];
            let connected = g.neighbors_undirected(idx).next().is_some();
            if connected {
                by_level.entry(level[&idx]).or_default().push(name.as_str());
            } else {
                isolated.push(name.clone());
            }
        }

        let mut order: Vec<StageName> = Vec::with_capacity(g.node_count());
        for (lvl, mut names) in by_level {
            names.sort_unstable();
            debug!(level = lvl, stages = ?names, "stage level");
            order.extend(names.into_iter().map(str::to_string));
        }

        for name in &isolated {
            warn!(
                stage = %name,
                "stage does not depend on anything and nothing depends on it; adding to queue anyway"
            );
            order.push(name.clone());
        }

        Ok(ExecutionOrder { order, isolated })
    }
}
