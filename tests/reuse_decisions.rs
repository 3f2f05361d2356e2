// tests/reuse_decisions.rs

mod common;

use std::collections::BTreeSet;

use batchdag::config::OptionValue;
use batchdag::plan::PipelinePlan;
use batchdag::provenance::{EnvSnapshot, ProvenanceRecord, ProvenanceStore, TrackedVersion};
use batchdag::reuse::{ClusterHistory, DecisionMap, ReuseEngine, ReuseOptions, StatusOracle};
use batchdag::types::{BackendKind, Decision};
use batchdag_test_utils::fakes::FakeStatusOracle;
use batchdag_test_utils::{init_tracing, with_timeout};

use common::{SITE, fetch_process_report, mock_store};

/// Pretend every stage of `plan` ran on the cluster as job `base + i`.
fn record_cluster_run(store: &ProvenanceStore, plan: &PipelinePlan, base: u64, env: &EnvSnapshot) {
    for (i, stage) in plan.stages_in_order().enumerate() {
        let id = (base + i as u64).to_string();
        store
            .fs()
            .write(&store.layout().slurm_out_file(&stage.name, SITE, &id), b"")
            .unwrap();
        let record = ProvenanceRecord::new(stage, &id, BackendKind::Slurm, env.clone()).unwrap();
        store.save(&record).unwrap();
    }
}

async fn decide(
    store: &ProvenanceStore,
    oracle: &dyn StatusOracle,
    plan: &PipelinePlan,
    env: &EnvSnapshot,
    options: &ReuseOptions,
) -> DecisionMap {
    let cluster = Some(ClusterHistory { site: SITE, oracle });
    with_timeout(ReuseEngine::new(store, cluster, env, options).decide(plan))
        .await
        .unwrap()
}

fn labels(map: &DecisionMap) -> Vec<(String, Decision)> {
    map.iter().map(|(n, d)| (n.to_string(), d)).collect()
}

fn all(decision: Decision) -> Vec<(String, Decision)> {
    ["fetch", "process", "report"]
        .iter()
        .map(|n| (n.to_string(), decision))
        .collect()
}

#[tokio::test]
async fn test_no_history_submits_everything() {
    init_tracing();
    let (_fs, store) = mock_store();
    let plan = fetch_process_report(3000).plan();
    let oracle = FakeStatusOracle::all_completed();

    let map = decide(&store, &oracle, &plan, &EnvSnapshot::default(), &ReuseOptions::default()).await;
    assert_eq!(labels(&map), all(Decision::Submit));
}

#[tokio::test]
async fn test_completed_matching_runs_are_reused() {
    init_tracing();
    let (_fs, store) = mock_store();
    let plan = fetch_process_report(3000).plan();
    let env = EnvSnapshot::default();
    record_cluster_run(&store, &plan, 100, &env);

    let oracle = FakeStatusOracle::all_completed();
    let map = decide(&store, &oracle, &plan, &env, &ReuseOptions::default()).await;
    assert_eq!(labels(&map), all(Decision::Reuse));
}

#[tokio::test]
async fn test_incomplete_job_demotes_downstream() {
    init_tracing();
    let (_fs, store) = mock_store();
    let plan = fetch_process_report(3000).plan();
    let env = EnvSnapshot::default();
    record_cluster_run(&store, &plan, 100, &env);

    let oracle = FakeStatusOracle::all_completed();
    // fetch=100, process=101, report=102
    oracle.set("101", &["COMPLETED", "FAILED"]);

    let map = decide(&store, &oracle, &plan, &env, &ReuseOptions::default()).await;
    assert_eq!(map.get("fetch"), Some(Decision::Reuse));
    assert_eq!(map.get("process"), Some(Decision::Submit));
    assert_eq!(map.get("report"), Some(Decision::Submit));
}

#[tokio::test]
async fn test_unavailable_accounting_means_submit() {
    init_tracing();
    let (_fs, store) = mock_store();
    let plan = fetch_process_report(3000).plan();
    let env = EnvSnapshot::default();
    record_cluster_run(&store, &plan, 100, &env);

    let oracle = FakeStatusOracle::unavailable();
    let map = decide(&store, &oracle, &plan, &env, &ReuseOptions::default()).await;
    assert_eq!(labels(&map), all(Decision::Submit));
}

#[tokio::test]
async fn test_changed_spec_resubmits_stage_and_dependents() {
    init_tracing();
    let (_fs, store) = mock_store();
    let env = EnvSnapshot::default();
    record_cluster_run(&store, &fetch_process_report(3000).plan(), 100, &env);

    let changed = fetch_process_report(4000).plan();
    let oracle = FakeStatusOracle::all_completed();
    let map = decide(&store, &oracle, &changed, &env, &ReuseOptions::default()).await;

    assert_eq!(map.get("fetch"), Some(Decision::Reuse));
    assert_eq!(map.get("process"), Some(Decision::Submit));
    assert_eq!(map.get("report"), Some(Decision::Submit));
}

#[tokio::test]
async fn test_resource_changes_do_not_block_reuse() {
    init_tracing();
    let (_fs, store) = mock_store();
    let env = EnvSnapshot::default();
    record_cluster_run(&store, &fetch_process_report(3000).plan(), 100, &env);

    let relaid = {
        use batchdag_test_utils::builders::{PipelineBuilder, StageBuilder};
        PipelineBuilder::new(common::ROOT)
            .with_stage("fetch", StageBuilder::new("fetch.py").nproc(8).threads(4))
            .with_stage(
                "process",
                StageBuilder::new("process.py")
                    .after("fetch")
                    .option("lmax", OptionValue::Int(3000))
                    .walltime("05:00:00"),
            )
            .with_stage("report", StageBuilder::new("report.py").after("process"))
            .plan()
    };

    let oracle = FakeStatusOracle::all_completed();
    let map = decide(&store, &oracle, &relaid, &env, &ReuseOptions::default()).await;
    assert_eq!(labels(&map), all(Decision::Reuse));
}

#[tokio::test]
async fn test_environment_change_unless_ignored() {
    init_tracing();
    let (_fs, store) = mock_store();
    let plan = fetch_process_report(3000).plan();
    let mut old_env = EnvSnapshot::default();
    old_env.tracked.insert(
        "lib".to_string(),
        TrackedVersion {
            revision: Some("aaa".to_string()),
            ..TrackedVersion::default()
        },
    );
    record_cluster_run(&store, &plan, 100, &old_env);

    let mut new_env = old_env.clone();
    new_env.tracked.get_mut("lib").unwrap().dirty = true;

    let oracle = FakeStatusOracle::all_completed();
    let map = decide(&store, &oracle, &plan, &new_env, &ReuseOptions::default()).await;
    assert_eq!(labels(&map), all(Decision::Submit));

    let ignoring = ReuseOptions {
        ignore_git: true,
        ..ReuseOptions::default()
    };
    let map = decide(&store, &oracle, &plan, &new_env, &ignoring).await;
    assert_eq!(labels(&map), all(Decision::Reuse));
}

#[tokio::test]
async fn test_skip_and_no_reuse() {
    init_tracing();
    let (_fs, store) = mock_store();
    let plan = fetch_process_report(3000).plan();
    let env = EnvSnapshot::default();
    record_cluster_run(&store, &plan, 100, &env);
    let oracle = FakeStatusOracle::all_completed();

    let options = ReuseOptions {
        no_reuse: true,
        skip: BTreeSet::from(["fetch".to_string()]),
        ..ReuseOptions::default()
    };
    let map = decide(&store, &oracle, &plan, &env, &options).await;
    assert_eq!(map.get("fetch"), Some(Decision::Skip));
    assert_eq!(map.get("process"), Some(Decision::Submit));
    assert_eq!(map.get("report"), Some(Decision::Submit));
}

#[tokio::test]
async fn test_skipped_dependency_does_not_demote_reuse() {
    init_tracing();
    let (_fs, store) = mock_store();
    let plan = fetch_process_report(3000).plan();
    let env = EnvSnapshot::default();
    record_cluster_run(&store, &plan, 100, &env);

    let oracle = FakeStatusOracle::all_completed();
    oracle.set("100", &["FAILED"]);
    let options = ReuseOptions {
        skip: BTreeSet::from(["fetch".to_string()]),
        ..ReuseOptions::default()
    };

    let map = decide(&store, &oracle, &plan, &env, &options).await;
    assert_eq!(map.get("fetch"), Some(Decision::Skip));
    assert_eq!(map.get("process"), Some(Decision::Reuse));
    assert_eq!(map.get("report"), Some(Decision::Reuse));
}

#[tokio::test]
async fn test_unreadable_record_degrades_to_submit() {
    init_tracing();
    let (fs, store) = mock_store();
    let plan = fetch_process_report(3000).plan();
    let env = EnvSnapshot::default();
    record_cluster_run(&store, &plan, 100, &env);
    fs.add_file(store.layout().record_path("report", "102"), "garbage [[");

    let oracle = FakeStatusOracle::all_completed();
    let map = decide(&store, &oracle, &plan, &env, &ReuseOptions::default()).await;
    assert_eq!(map.get("fetch"), Some(Decision::Reuse));
    assert_eq!(map.get("process"), Some(Decision::Reuse));
    assert_eq!(map.get("report"), Some(Decision::Submit));
}

#[tokio::test]
async fn test_newer_local_attempt_wins_over_cluster() {
    init_tracing();
    let (_fs, store) = mock_store();
    let env = EnvSnapshot::default();

    // Older cluster run with lmax = 3000.
    let old = fetch_process_report(3000).plan();
    record_cluster_run(&store, &old, 100, &env);

    // Newer local run of `process` with lmax = 4000.
    let new = fetch_process_report(4000).plan();
    let stage = new.stage("process").unwrap();
    store.write_local_marker("process", "1700000000000").unwrap();
    let mut record =
        ProvenanceRecord::new(stage, "1700000000000", BackendKind::Local, env.clone()).unwrap();
    record.created_at += chrono::Duration::seconds(60);
    store.save(&record).unwrap();

    let oracle = FakeStatusOracle::all_completed();
    let map = decide(&store, &oracle, &new, &env, &ReuseOptions::default()).await;
    assert_eq!(map.get("process"), Some(Decision::Reuse));
    // report's record was made against the old process spec but its own spec
    // is unchanged, so it stays reusable.
    assert_eq!(map.get("report"), Some(Decision::Reuse));

    // Against the old spec, the newer local record no longer matches.
    let map = decide(&store, &oracle, &old, &env, &ReuseOptions::default()).await;
    assert_eq!(map.get("process"), Some(Decision::Submit));
    assert_eq!(map.get("report"), Some(Decision::Submit));
}

#[tokio::test]
async fn test_without_cluster_history_only_local_markers_count() {
    init_tracing();
    let (_fs, store) = mock_store();
    let plan = fetch_process_report(3000).plan();
    let env = EnvSnapshot::default();
    record_cluster_run(&store, &plan, 100, &env);

    let options = ReuseOptions::default();
    let map = with_timeout(ReuseEngine::new(&store, None, &env, &options).decide(&plan))
        .await
        .unwrap();
    assert_eq!(labels(&map), all(Decision::Submit));
}
