// src/lib.rs

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod plan;
pub mod provenance;
pub mod resources;
pub mod reuse;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::cli::CliArgs;
use crate::config::loader::load_plan;
use crate::config::site::{
    NodeHardware, SiteProfile, detect_site, load_site, resolve_site_dir,
};
use crate::dispatch::{
    AssumeYes, ConfirmPrompt, DispatchReport, Dispatcher, LinePrompt, RunOutcome, render_summary,
};
use crate::errors::{BatchdagError, Result};
use crate::exec::{Backend, LocalBackend, SlurmBackend, slurm_available};
use crate::fs::{FileSystem, RealFileSystem};
use crate::plan::PipelinePlan;
use crate::provenance::{EnvSnapshot, GitProbe, ProjectLayout, ProvenanceStore};
use crate::reuse::{ClusterHistory, ReuseEngine, ReuseOptions, SacctOracle};
use crate::types::BackendKind;

/// Everything one orchestration run works with, already resolved.
pub struct RunContext<'a> {
    pub plan: &'a PipelinePlan,
    pub store: &'a ProvenanceStore,
    pub backend: &'a mut dyn Backend,
    /// Cluster attempt lookup; `None` when only local history counts.
    pub cluster: Option<ClusterHistory<'a>>,
    /// Node hardware for layout translation; `None` for local execution.
    pub hardware: Option<NodeHardware>,
    pub environment: &'a EnvSnapshot,
    pub reuse: &'a ReuseOptions,
    pub prompt: &'a mut dyn ConfirmPrompt,
    pub dry_run: bool,
}

/// Decide, summarise, confirm, dispatch.
pub async fn execute(ctx: RunContext<'_>) -> Result<RunOutcome> {
    let RunContext {
        plan,
        store,
        backend,
        cluster,
        hardware,
        environment,
        reuse,
        prompt,
        dry_run,
    } = ctx;

    let decisions = ReuseEngine::new(store, cluster, environment, reuse)
        .decide(plan)
        .await?;

    print!("{}", render_summary(store.layout().project(), &decisions));
    if !prompt.confirm("Proceed with this?")? {
        info!("aborted at confirmation prompt");
        return Ok(RunOutcome::Aborted);
    }

    let report = Dispatcher::new(backend, store, hardware, environment, dry_run)
        .run(plan, &decisions)
        .await?;
    Ok(RunOutcome::Completed(report))
}

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - pipeline loading and planning
/// - backend selection (SLURM or local)
/// - site profile resolution
/// - environment snapshot
/// - reuse decisions, confirmation and dispatch
pub async fn run(args: CliArgs) -> Result<RunOutcome> {
    if args.show_site_dir {
        println!("{}", resolve_site_dir(args.site_dir.as_deref()).display());
        return Ok(RunOutcome::Completed(DispatchReport::default()));
    }

    let project = args
        .project
        .clone()
        .ok_or_else(|| BatchdagError::config("missing project name"))?;
    let config_path = args
        .config
        .clone()
        .ok_or_else(|| BatchdagError::config("missing pipeline file"))?;

    let (config, plan) = load_plan(&config_path)?;
    let skip = plan.resolve_names(&args.skip)?;

    let backend_kind = select_backend(&args).await;
    if args.dry_run {
        info!("dry run: nothing will be submitted, run or written");
    }

    let root_dir: PathBuf = std::path::absolute(&config.root_dir)?;
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let layout = ProjectLayout::new(root_dir, &project);
    let store = ProvenanceStore::new(fs.clone(), layout.clone());

    let environment = EnvSnapshot::capture(&config.track, &GitProbe).await?;
    let reuse = ReuseOptions {
        no_reuse: args.no_reuse,
        ignore_git: args.ignore_git,
        skip,
    };

    let mut prompt: Box<dyn ConfirmPrompt> = if args.yes {
        Box::new(AssumeYes)
    } else {
        Box::new(LinePrompt::stdio())
    };

    match backend_kind {
        BackendKind::Slurm => {
            let site = resolve_site_profile(&args)?;
            let oracle = SacctOracle;
            let mut backend = SlurmBackend::new(site, layout, fs, args.dry_run);
            let site_name = backend.site().name.clone();
            let hardware = backend.site().hardware;

            execute(RunContext {
                plan: &plan,
                store: &store,
                backend: &mut backend,
                cluster: Some(ClusterHistory {
                    site: &site_name,
                    oracle: &oracle,
                }),
                hardware: Some(hardware),
                environment: &environment,
                reuse: &reuse,
                prompt: prompt.as_mut(),
                dry_run: args.dry_run,
            })
            .await
        }
        BackendKind::Local => {
            let mut backend = LocalBackend::new(store.clone(), args.dry_run);

            execute(RunContext {
                plan: &plan,
                store: &store,
                backend: &mut backend,
                cluster: None,
                hardware: None,
                environment: &environment,
                reuse: &reuse,
                prompt: prompt.as_mut(),
                dry_run: args.dry_run,
            })
            .await
        }
    }
}

async fn select_backend(args: &CliArgs) -> BackendKind {
    if args.force_local {
        return BackendKind::Local;
    }
    if args.force_slurm {
        return BackendKind::Slurm;
    }
    if slurm_available().await {
        BackendKind::Slurm
    } else {
        info!("no SLURM detected; running stages locally one after another");
        BackendKind::Local
    }
}

fn resolve_site_profile(args: &CliArgs) -> Result<SiteProfile> {
    let site = match &args.site {
        Some(site) => site.clone(),
        None => detect_site(|var| std::env::var(var).ok())?,
    };
    let site_dir = resolve_site_dir(args.site_dir.as_deref());
    let cfg = load_site(&site_dir, &site)?;
    SiteProfile::resolve(&site, &cfg, &args.site_overrides())
}
