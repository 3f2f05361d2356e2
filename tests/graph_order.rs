// tests/graph_order.rs

use std::collections::{BTreeMap, HashMap};

use batchdag::errors::BatchdagError;
use batchdag::plan::DependencyGraph;
use batchdag_test_utils::builders::{PipelineBuilder, StageBuilder};
use proptest::prelude::*;

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn deps(pairs: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), names(v)))
        .collect()
}

#[test]
fn test_levels_then_lexicographic_within_level() {
    let stages = names(&["d", "c", "b", "a"]);
    let map = deps(&[("b", &["a"]), ("c", &["a"]), ("d", &["b", "c"])]);
    let graph = DependencyGraph::new(&stages, &map).unwrap();
    graph.check_acyclic().unwrap();

    let order = graph.execution_order().unwrap();
    assert_eq!(order.order, names(&["a", "b", "c", "d"]));
    assert!(order.isolated.is_empty());
}

#[test]
fn test_level_is_longest_path() {
    // a -> b -> c and a -> c: c sits on level 2, not 1.
    let stages = names(&["a", "b", "c", "x"]);
    let map = deps(&[("b", &["a"]), ("c", &["a", "b"]), ("x", &["a"])]);
    let graph = DependencyGraph::new(&stages, &map).unwrap();

    let order = graph.execution_order().unwrap();
    assert_eq!(order.order, names(&["a", "b", "x", "c"]));
}

#[test]
fn test_isolated_stages_follow_in_declaration_order() {
    let stages = names(&["zz", "a", "b", "lonely"]);
    let map = deps(&[("b", &["a"])]);
    let graph = DependencyGraph::new(&stages, &map).unwrap();

    let order = graph.execution_order().unwrap();
    assert_eq!(order.order, names(&["a", "b", "zz", "lonely"]));
    assert_eq!(order.isolated, names(&["zz", "lonely"]));
}

#[test]
fn test_cycle_path_is_reported() {
    let stages = names(&["a", "b", "c"]);
    let map = deps(&[("a", &["c"]), ("b", &["a"]), ("c", &["b"])]);
    let graph = DependencyGraph::new(&stages, &map).unwrap();

    match graph.check_acyclic() {
        Err(BatchdagError::DagCycle(msg)) => {
            assert!(msg.contains("->"));
            for n in ["a", "b", "c"] {
                assert!(msg.contains(n), "{msg}");
            }
        }
        other => panic!("Expected DagCycle, got {other:?}"),
    }
}

#[test]
fn test_dependency_on_sweep_parent_expands_to_all_instances() {
    let plan = PipelineBuilder::new("/tmp/out")
        .with_stage("sim", StageBuilder::new("sim.py").sweep(&["x", "y", "z"]))
        .with_stage("combine", StageBuilder::new("combine.py").after("sim"))
        .plan();

    assert!(plan.stage("sim").is_none());
    assert_eq!(
        plan.graph().dependencies_of("combine"),
        vec!["sim_x", "sim_y", "sim_z"]
    );
    assert_eq!(plan.order(), names(&["sim_x", "sim_y", "sim_z", "combine"]).as_slice());
    assert_eq!(plan.stage("sim_y").unwrap().arg.as_deref(), Some("y"));
    assert_eq!(
        plan.stage("sim_y").unwrap().sweep_parent.as_deref(),
        Some("sim")
    );
}

#[test]
fn test_sweep_expansion_is_deterministic() {
    let build = || {
        PipelineBuilder::new("/tmp/out")
            .with_stage("b", StageBuilder::new("b.py").sweep(&["2", "1"]))
            .with_stage("a", StageBuilder::new("a.py").after("b"))
            .plan()
    };
    let first = build();
    let second = build();
    assert_eq!(first.order(), second.order());
    assert_eq!(first.sweeps(), second.sweeps());
    assert_eq!(first.sweeps()["b"], names(&["b_2", "b_1"]));
}

// Acyclic by construction: stage i may only depend on stages 0..i.
fn acyclic_deps(max: usize) -> impl Strategy<Value = (Vec<String>, BTreeMap<String, Vec<String>>)> {
    (1..=max).prop_flat_map(|n| {
        proptest::collection::vec(proptest::collection::vec(any::<usize>(), 0..4), n).prop_map(
            move |raw| {
                let stages: Vec<String> = (0..n).map(|i| format!("s{i:02}")).collect();
                let mut map = BTreeMap::new();
                for (i, picks) in raw.into_iter().enumerate() {
                    if i == 0 {
                        continue;
                    }
                    let mut d: Vec<String> = picks.into_iter().map(|p| stages[p % i].clone()).collect();
                    d.sort();
                    d.dedup();
                    if !d.is_empty() {
                        map.insert(stages[i].clone(), d);
                    }
                }
                // Shuffle declaration order deterministically.
                let mut declared = stages.clone();
                declared.reverse();
                (declared, map)
            },
        )
    })
}

proptest! {
    #[test]
    fn prop_order_is_topological_and_complete((stages, map) in acyclic_deps(12)) {
        let graph = DependencyGraph::new(&stages, &map).unwrap();
        prop_assert!(graph.check_acyclic().is_ok());
        let order = graph.execution_order().unwrap().order;

        prop_assert_eq!(order.len(), stages.len());
        let pos: HashMap<&str, usize> = order.iter().enumerate().map(|(i, n)| (n.as_str(), i)).collect();
        prop_assert_eq!(pos.len(), stages.len());

        for (stage, ds) in &map {
            for d in ds {
                prop_assert!(pos[d.as_str()] < pos[stage.as_str()], "{} must precede {}", d, stage);
            }
        }
    }

    #[test]
    fn prop_back_edge_is_rejected((stages, map) in acyclic_deps(8), pick in any::<usize>()) {
        // Make the first stage that has dependencies also depended on by one of its deps.
        if let Some((stage, ds)) = map.iter().next() {
            let dep = ds[pick % ds.len()].clone();
            let mut cyclic = map.clone();
            cyclic.entry(dep).or_default().push(stage.clone());
            let graph = DependencyGraph::new(&stages, &cyclic).unwrap();
            prop_assert!(
                matches!(graph.check_acyclic(), Err(BatchdagError::DagCycle(_))),
                "expected a cycle"
            );
        }
    }
}
