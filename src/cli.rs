// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::site::SiteOverrides;

/// Command-line arguments for `batchdag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "batchdag",
    version,
    about = "Run multi-stage pipelines on SLURM or locally, reusing finished stages.",
    long_about = None
)]
pub struct CliArgs {
    /// Name of the project; outputs go to `<root_dir>/<project>/<stage>`.
    #[arg(required_unless_present = "show_site_dir")]
    pub project: Option<String>,

    /// Path to the pipeline file (TOML).
    #[arg(value_name = "CONFIG", required_unless_present = "show_site_dir")]
    pub config: Option<PathBuf>,

    /// Name of a site file in the site directory.
    ///
    /// If omitted, the site is detected from `CLUSTER` / `NERSC_HOST`, else
    /// the generic template is used.
    #[arg(long, value_name = "NAME")]
    pub site: Option<String>,

    /// Directory holding `<site>.toml` files.
    ///
    /// Default: `BATCHDAG_SITE_DIR`, else `./sites`.
    #[arg(long, value_name = "DIR")]
    pub site_dir: Option<PathBuf>,

    /// Print the site directory and exit.
    #[arg(long)]
    pub show_site_dir: bool,

    /// Only show what would be submitted; write nothing.
    #[arg(long)]
    pub dry_run: bool,

    /// Do not reuse any stage (stages in --skip are still skipped).
    #[arg(long)]
    pub no_reuse: bool,

    /// Ignore tracked source changes when deciding whether to reuse a stage.
    #[arg(long)]
    pub ignore_git: bool,

    /// Run stages locally even when SLURM is available.
    #[arg(long, conflicts_with = "force_slurm")]
    pub force_local: bool,

    /// Submit to SLURM even when `sbatch` was not detected.
    #[arg(long)]
    pub force_slurm: bool,

    /// Stages to skip, even if others depend on them. A sweep name skips all
    /// of its instances.
    #[arg(long, value_name = "STAGE", num_args = 1..)]
    pub skip: Vec<String>,

    /// sbatch account (`none` to omit).
    #[arg(short = 'A', long, value_name = "ACCOUNT")]
    pub account: Option<String>,

    /// QOS name (`none` to omit).
    #[arg(short, long, value_name = "QOS")]
    pub qos: Option<String>,

    /// Partition name.
    #[arg(short, long, value_name = "PARTITION")]
    pub partition: Option<String>,

    /// Constraint name.
    #[arg(short, long, value_name = "CONSTRAINT")]
    pub constraint: Option<String>,

    /// Do not ask for confirmation.
    #[arg(short, long)]
    pub yes: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `BATCHDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

impl CliArgs {
    pub fn site_overrides(&self) -> SiteOverrides {
        SiteOverrides {
            account: self.account.clone(),
            qos: self.qos.clone(),
            partition: self.partition.clone(),
            constraint: self.constraint.clone(),
        }
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
