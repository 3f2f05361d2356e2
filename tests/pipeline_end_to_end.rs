// tests/pipeline_end_to_end.rs

mod common;

use std::io::Cursor;

use batchdag::dispatch::{AssumeYes, ConfirmPrompt, LinePrompt, RunOutcome};
use batchdag::errors::BatchdagError;
use batchdag::exec::{Backend, JobRequest, LocalBackend};
use batchdag::plan::PipelinePlan;
use batchdag::provenance::{EnvSnapshot, ProvenanceStore};
use batchdag::reuse::{ClusterHistory, ReuseOptions};
use batchdag::types::BackendKind;
use batchdag::{RunContext, execute};
use batchdag_test_utils::builders::{PipelineBuilder, StageBuilder};
use batchdag_test_utils::fakes::{FakeBackend, FakeStatusOracle};
use batchdag_test_utils::{init_tracing, with_timeout};

use common::{ROOT, SITE, fetch_process_report, hardware, mock_store};

struct Harness {
    store: ProvenanceStore,
    oracle: FakeStatusOracle,
    env: EnvSnapshot,
}

impl Harness {
    async fn run(
        &self,
        plan: &PipelinePlan,
        backend: &mut dyn Backend,
        prompt: &mut dyn ConfirmPrompt,
        dry_run: bool,
    ) -> Result<RunOutcome, BatchdagError> {
        let reuse = ReuseOptions::default();
        with_timeout(execute(RunContext {
            plan,
            store: &self.store,
            backend,
            cluster: Some(ClusterHistory {
                site: SITE,
                oracle: &self.oracle,
            }),
            hardware: Some(hardware(32)),
            environment: &self.env,
            reuse: &reuse,
            prompt,
            dry_run,
        }))
        .await
    }
}

fn completed(outcome: RunOutcome) -> batchdag::dispatch::DispatchReport {
    match outcome {
        RunOutcome::Completed(report) => report,
        RunOutcome::Aborted => panic!("run was aborted"),
    }
}

fn dependency_of<'a>(requests: &'a [JobRequest], stage: &str) -> Option<&'a str> {
    requests
        .iter()
        .find(|r| r.stage.name == stage)
        .and_then(|r| r.dependency.as_deref())
}

#[tokio::test]
async fn test_submit_then_reuse_then_partial_resubmit() {
    init_tracing();
    let (_fs, store) = mock_store();
    let harness = Harness {
        store: store.clone(),
        oracle: FakeStatusOracle::all_completed(),
        env: EnvSnapshot::default(),
    };
    let mut backend = FakeBackend::slurm().writing_cluster_logs(store.clone(), SITE);
    let log = backend.clone();

    // First run: everything is new.
    let plan = fetch_process_report(3000).plan();
    let report = completed(
        harness
            .run(&plan, &mut backend, &mut AssumeYes, false)
            .await
            .unwrap(),
    );
    assert_eq!(report.submitted, vec!["fetch", "process", "report"]);
    assert_eq!(report.job_ids["fetch"], "1000");
    assert_eq!(report.records.len(), 3);

    let requests = log.requests();
    assert_eq!(dependency_of(&requests, "fetch"), None);
    assert_eq!(dependency_of(&requests, "process"), Some("--dependency=afterok:1000"));
    assert_eq!(dependency_of(&requests, "report"), Some("--dependency=afterok:1001"));
    assert!(requests.iter().all(|r| r.layout.is_some()));
    assert!(store.fs().is_file(&store.layout().record_path("process", "1001")));

    // Second run: identical configuration, all reused.
    log.clear();
    let report = completed(
        harness
            .run(&plan, &mut backend, &mut AssumeYes, false)
            .await
            .unwrap(),
    );
    assert!(report.submitted.is_empty());
    assert!(log.requests().is_empty());

    // Third run: `process` changed; it and `report` are resubmitted.
    let changed = fetch_process_report(4000).plan();
    let report = completed(
        harness
            .run(&changed, &mut backend, &mut AssumeYes, false)
            .await
            .unwrap(),
    );
    assert_eq!(report.submitted, vec!["process", "report"]);

    let requests = log.requests();
    assert_eq!(dependency_of(&requests, "process"), None);
    assert_eq!(
        dependency_of(&requests, "report"),
        Some(format!("--dependency=afterok:{}", report.job_ids["process"]).as_str())
    );
}

#[tokio::test]
async fn test_declining_the_prompt_submits_nothing() {
    init_tracing();
    let (fs, store) = mock_store();
    let harness = Harness {
        store,
        oracle: FakeStatusOracle::all_completed(),
        env: EnvSnapshot::default(),
    };
    let mut backend = FakeBackend::slurm();
    let log = backend.clone();
    let mut prompt = LinePrompt::new(Cursor::new("n\n"), Vec::new());

    let plan = fetch_process_report(3000).plan();
    let outcome = harness
        .run(&plan, &mut backend, &mut prompt, false)
        .await
        .unwrap();

    assert_eq!(outcome, RunOutcome::Aborted);
    assert!(log.requests().is_empty());
    assert!(fs.files().is_empty());
}

#[tokio::test]
async fn test_prompt_asks_again_on_unclear_answer() {
    init_tracing();
    let (_fs, store) = mock_store();
    let harness = Harness {
        store,
        oracle: FakeStatusOracle::all_completed(),
        env: EnvSnapshot::default(),
    };
    let mut backend = FakeBackend::slurm();
    let log = backend.clone();
    let mut prompt = LinePrompt::new(Cursor::new("maybe\nYES\n"), Vec::new());

    let plan = fetch_process_report(3000).plan();
    let report = completed(
        harness
            .run(&plan, &mut backend, &mut prompt, false)
            .await
            .unwrap(),
    );
    assert_eq!(report.submitted.len(), 3);
    assert_eq!(log.submitted_stages(), vec!["fetch", "process", "report"]);
}

#[tokio::test]
async fn test_dry_run_writes_no_records() {
    init_tracing();
    let (fs, store) = mock_store();
    let harness = Harness {
        store,
        oracle: FakeStatusOracle::all_completed(),
        env: EnvSnapshot::default(),
    };
    let mut backend = FakeBackend::slurm();

    let plan = fetch_process_report(3000).plan();
    let report = completed(
        harness
            .run(&plan, &mut backend, &mut AssumeYes, true)
            .await
            .unwrap(),
    );
    assert_eq!(report.submitted.len(), 3);
    assert!(report.records.is_empty());
    assert!(fs.files().is_empty());
}

#[tokio::test]
async fn test_backend_failure_is_fatal_and_stops_dispatch() {
    init_tracing();
    let (_fs, store) = mock_store();
    let harness = Harness {
        store: store.clone(),
        oracle: FakeStatusOracle::all_completed(),
        env: EnvSnapshot::default(),
    };
    let mut backend = FakeBackend::slurm().failing_on("process");
    let log = backend.clone();

    let plan = fetch_process_report(3000).plan();
    let err = harness
        .run(&plan, &mut backend, &mut AssumeYes, false)
        .await
        .unwrap_err();

    match err {
        BatchdagError::Backend { stage, .. } => assert_eq!(stage, "process"),
        other => panic!("Expected Backend error, got {other:?}"),
    }
    assert_eq!(log.submitted_stages(), vec!["fetch", "process"]);
    // fetch was recorded before the failure, process was not.
    assert!(store.fs().is_file(&store.layout().record_path("fetch", "1000")));
    assert!(!store.fs().is_file(&store.layout().record_path("process", "1001")));
}

#[tokio::test]
async fn test_bad_resource_hint_fails_before_any_submission() {
    init_tracing();
    let (_fs, store) = mock_store();
    let harness = Harness {
        store,
        oracle: FakeStatusOracle::all_completed(),
        env: EnvSnapshot::default(),
    };
    let mut backend = FakeBackend::slurm();
    let log = backend.clone();

    // Memory request without a minimum thread count cannot be laid out.
    let plan = PipelineBuilder::new(ROOT)
        .with_stage("ok", StageBuilder::new("ok.py").threads(8))
        .with_stage("bad", StageBuilder::new("bad.py").memory(16.0, None))
        .plan();

    let result = harness.run(&plan, &mut backend, &mut AssumeYes, false).await;
    assert!(matches!(result, Err(BatchdagError::ConfigError(_))));
    assert!(log.requests().is_empty());
}

#[tokio::test]
async fn test_local_backend_gets_no_dependency_clauses_and_no_layouts() {
    init_tracing();
    let (_fs, store) = mock_store();
    let mut backend = FakeBackend::local().writing_local_markers(store.clone());
    let log = backend.clone();
    let env = EnvSnapshot::default();
    let reuse = ReuseOptions::default();
    let plan = fetch_process_report(3000).plan();

    let report = completed(
        with_timeout(execute(RunContext {
            plan: &plan,
            store: &store,
            backend: &mut backend,
            cluster: None,
            hardware: None,
            environment: &env,
            reuse: &reuse,
            prompt: &mut AssumeYes,
            dry_run: false,
        }))
        .await
        .unwrap(),
    );

    assert_eq!(report.submitted.len(), 3);
    let requests = log.requests();
    assert!(requests.iter().all(|r| r.dependency.is_none() && r.layout.is_none()));
    let record = store.load("report", &report.job_ids["report"]).unwrap();
    assert_eq!(record.backend, BackendKind::Local);

    // Markers make the next local run reuse everything.
    log.clear();
    let report = completed(
        with_timeout(execute(RunContext {
            plan: &plan,
            store: &store,
            backend: &mut backend,
            cluster: None,
            hardware: None,
            environment: &env,
            reuse: &reuse,
            prompt: &mut AssumeYes,
            dry_run: false,
        }))
        .await
        .unwrap(),
    );
    assert!(report.submitted.is_empty());
}

#[tokio::test]
async fn test_local_backend_dry_run_runs_nothing() {
    init_tracing();
    let (fs, store) = mock_store();
    let mut backend = LocalBackend::new(store.clone(), true);
    let env = EnvSnapshot::default();
    let reuse = ReuseOptions::default();
    let plan = fetch_process_report(3000).plan();

    let report = completed(
        with_timeout(execute(RunContext {
            plan: &plan,
            store: &store,
            backend: &mut backend,
            cluster: None,
            hardware: None,
            environment: &env,
            reuse: &reuse,
            prompt: &mut AssumeYes,
            dry_run: true,
        }))
        .await
        .unwrap(),
    );

    assert_eq!(report.job_ids["fetch"], "1");
    assert_eq!(report.job_ids["report"], "3");
    assert!(fs.files().is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn test_local_backend_runs_real_processes() {
    use std::sync::Arc;

    use batchdag::fs::{FileSystem, RealFileSystem};
    use batchdag::provenance::ProjectLayout;

    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let scripts = dir.path().join("scripts");
    std::fs::create_dir_all(&scripts).unwrap();
    let ok = scripts.join("ok.sh");
    let broken = scripts.join("broken.sh");
    std::fs::write(&ok, "echo \"writing to $2\"\nexit 0\n").unwrap();
    std::fs::write(&broken, "echo 'bad input' >&2\nexit 3\n").unwrap();

    let root = dir.path().join("out");
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let store = ProvenanceStore::new(fs.clone(), ProjectLayout::new(&root, "demo"));
    let env = EnvSnapshot::default();
    let reuse = ReuseOptions::default();

    // A stage whose process exits 0 gets a marker and a record.
    let plan = PipelineBuilder::new(&root)
        .with_stage("fit", StageBuilder::new(ok.to_str().unwrap()))
        .plan();
    let mut backend = LocalBackend::new(store.clone(), false).with_program("sh");
    let report = completed(
        with_timeout(execute(RunContext {
            plan: &plan,
            store: &store,
            backend: &mut backend,
            cluster: None,
            hardware: None,
            environment: &env,
            reuse: &reuse,
            prompt: &mut AssumeYes,
            dry_run: false,
        }))
        .await
        .unwrap(),
    );

    let job_id = &report.job_ids["fit"];
    assert_eq!(store.latest_local_attempt("fit").as_ref(), Some(job_id));
    assert!(store.local_attempt_completed("fit", job_id));
    assert_eq!(report.records, vec![store.layout().record_path("fit", job_id)]);
    assert_eq!(store.load("fit", job_id).unwrap().backend, BackendKind::Local);

    // A non-zero exit is a backend error and leaves nothing behind.
    let plan = PipelineBuilder::new(&root)
        .with_stage("plot", StageBuilder::new(broken.to_str().unwrap()))
        .plan();
    let mut backend = LocalBackend::new(store.clone(), false).with_program("sh");
    let err = with_timeout(execute(RunContext {
        plan: &plan,
        store: &store,
        backend: &mut backend,
        cluster: None,
        hardware: None,
        environment: &env,
        reuse: &reuse,
        prompt: &mut AssumeYes,
        dry_run: false,
    }))
    .await
    .unwrap_err();

    match err {
        BatchdagError::Backend { stage, output } => {
            assert_eq!(stage, "plot");
            assert!(output.contains("exit code 3"), "{output}");
            assert!(output.contains("bad input"), "{output}");
        }
        other => panic!("Expected Backend error, got {other:?}"),
    }
    assert_eq!(store.latest_local_attempt("plot"), None);
    assert!(
        fs.file_names(&store.layout().stage_dir("plot"))
            .unwrap()
            .is_empty()
    );
}
