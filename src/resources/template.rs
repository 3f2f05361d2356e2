// src/resources/template.rs

//! Batch script templates.
//!
//! A site file carries a script template with `!NAME` placeholders, e.g.
//!
//! ```text
//! #!/bin/bash
//! #SBATCH --job-name=!JOBNAME
//! #SBATCH --nodes=!NODES
//! #SBATCH --ntasks=!TASKS
//! #SBATCH --ntasks-per-node=!TASKSPERNODE
//! #SBATCH --cpus-per-task=!HYPERTHREADS
//! #SBATCH --time=!WALL
//! #SBATCH --output=!OUT_%j.txt!ACCOUNT!QOS!PARTITION!CONSTRAINT
//! export OMP_NUM_THREADS=!THREADS
//! srun !CMD
//! ```
//!
//! Rendering is a pure substitution. Placeholders are matched as whole
//! upper-case words, so `!TASKS` never eats the prefix of `!TASKSPERNODE`.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::warn;

use crate::errors::{BatchdagError, Result};
use crate::resources::layout::ResourceLayout;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!([A-Z]+)").expect("placeholder regex is valid"));

/// Placeholders every template must contain.
pub const REQUIRED_PLACEHOLDERS: &[&str] = &["JOBNAME", "NODES", "TASKS", "WALL", "CMD", "OUT"];

/// Placeholders a template may contain.
pub const OPTIONAL_PLACEHOLDERS: &[&str] = &[
    "TASKSPERNODE",
    "THREADS",
    "HYPERTHREADS",
    "ACCOUNT",
    "CONSTRAINT",
    "QOS",
    "PARTITION",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchTemplate {
    text: String,
}

/// Everything needed to fill in a template for one stage.
#[derive(Debug, Clone)]
pub struct ScriptValues<'a> {
    pub job_name: &'a str,
    pub command: &'a str,
    /// Output log prefix; the template appends the job id and suffix.
    pub out_file_root: &'a str,
    pub layout: &'a ResourceLayout,
    pub account: Option<&'a str>,
    pub constraint: Option<&'a str>,
    pub qos: Option<&'a str>,
    pub partition: Option<&'a str>,
}

impl BatchTemplate {
    /// Check the placeholder contract and wrap the template text.
    pub fn parse(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        let found: BTreeSet<&str> = PLACEHOLDER
            .captures_iter(&text)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect();

        let missing: Vec<&str> = REQUIRED_PLACEHOLDERS
            .iter()
            .copied()
            .filter(|p| !found.contains(p))
            .collect();
        if !missing.is_empty() {
            return Err(BatchdagError::config(format!(
                "batch script template is missing placeholder(s): {}",
                missing
                    .iter()
                    .map(|p| format!("!{p}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }

        for name in found {
            if !is_known(name) {
                warn!(placeholder = %name, "unknown placeholder in batch template; left untouched");
            }
        }

        Ok(Self { text })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn render(&self, v: &ScriptValues<'_>) -> String {
        PLACEHOLDER
            .replace_all(&self.text, |caps: &Captures<'_>| {
                let name = &caps[1];
                match name {
                    "JOBNAME" => v.job_name.to_string(),
                    "NODES" => v.layout.nodes.to_string(),
                    "TASKS" => v.layout.processes.to_string(),
                    "TASKSPERNODE" => v.layout.tasks_per_node.to_string(),
                    "THREADS" => v.layout.threads.to_string(),
                    "HYPERTHREADS" => v.layout.hyperthreads().to_string(),
                    "WALL" => v.layout.walltime.clone(),
                    "CMD" => v.command.to_string(),
                    "OUT" => v.out_file_root.to_string(),
                    "ACCOUNT" => sbatch_line("account", v.account),
                    "CONSTRAINT" => sbatch_line("constraint", v.constraint),
                    "QOS" => sbatch_line("qos", v.qos),
                    "PARTITION" => sbatch_line("partition", v.partition),
                    _ => caps[0].to_string(),
                }
            })
            .into_owned()
    }
}

fn is_known(name: &str) -> bool {
    REQUIRED_PLACEHOLDERS.contains(&name) || OPTIONAL_PLACEHOLDERS.contains(&name)
}

fn sbatch_line(key: &str, value: Option<&str>) -> String {
    match value {
        Some(v) => format!("\n#SBATCH --{key}={v}"),
        None => String::new(),
    }
}
