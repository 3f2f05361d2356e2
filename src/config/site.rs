// src/config/site.rs

//! Cluster site descriptions.
//!
//! A site file (`<site_dir>/<site>.toml`) looks like:
//!
//! ```toml
//! template = """
//! #!/bin/bash
//! #SBATCH --nodes=!NODES
//! ...
//! """
//! default_constraint = "cpu"
//! default_partition = "regular"
//! default_qos = "none"
//! default_account = "none"
//!
//! [architecture.cpu.regular]
//! cores_per_node = 40
//! memory_per_node_gb = 192
//! threads_per_core = 2
//! ```
//!
//! The value `none` for constraint/partition/qos/account means "do not emit an
//! `#SBATCH` line for it".

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

use crate::errors::{BatchdagError, Result};
use crate::resources::BatchTemplate;

/// Environment variable that can point at the site directory.
pub const SITE_DIR_ENV: &str = "BATCHDAG_SITE_DIR";

/// Site used when nothing is given and nothing is detected.
pub const GENERIC_SITE: &str = "generic";

/// Environment variables that identify a known cluster.
const SITE_ENV_VARS: &[&str] = &["CLUSTER", "NERSC_HOST"];

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SiteConfig {
    pub template: String,
    #[serde(default)]
    pub default_constraint: Option<String>,
    #[serde(default)]
    pub default_partition: Option<String>,
    #[serde(default)]
    pub default_qos: Option<String>,
    #[serde(default)]
    pub default_account: Option<String>,
    /// `architecture.<constraint>.<partition>`
    #[serde(default)]
    pub architecture: BTreeMap<String, BTreeMap<String, NodeHardware>>,
}

/// Hardware of one node type.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeHardware {
    pub cores_per_node: u32,
    #[serde(default)]
    pub memory_per_node_gb: Option<f64>,
    #[serde(default)]
    pub threads_per_core: Option<u32>,
}

/// Command-line overrides of the site defaults.
#[derive(Debug, Clone, Default)]
pub struct SiteOverrides {
    pub account: Option<String>,
    pub qos: Option<String>,
    pub partition: Option<String>,
    pub constraint: Option<String>,
}

/// A site resolved for one run: template checked, partition hardware looked
/// up, scheduler options decided.
#[derive(Debug, Clone)]
pub struct SiteProfile {
    pub name: String,
    pub template: BatchTemplate,
    pub hardware: NodeHardware,
    pub constraint: Option<String>,
    pub partition: Option<String>,
    pub qos: Option<String>,
    pub account: Option<String>,
}

impl SiteConfig {
    /// Hardware for a constraint/partition pair.
    pub fn hardware(&self, constraint: &str, partition: &str) -> Result<NodeHardware> {
        self.architecture
            .get(constraint)
            .and_then(|parts| parts.get(partition))
            .copied()
            .ok_or_else(|| {
                BatchdagError::config(format!(
                    "site has no [architecture.{constraint}.{partition}] hardware description"
                ))
            })
    }
}

impl SiteProfile {
    pub fn resolve(name: &str, cfg: &SiteConfig, overrides: &SiteOverrides) -> Result<Self> {
        let constraint = pick(&overrides.constraint, &cfg.default_constraint, "constraint")?;
        let partition = pick(&overrides.partition, &cfg.default_partition, "partition")?;
        let qos = overrides.qos.clone().or_else(|| cfg.default_qos.clone());
        let account = overrides
            .account
            .clone()
            .or_else(|| cfg.default_account.clone());

        let hardware = cfg.hardware(&constraint, &partition)?;
        let template = BatchTemplate::parse(cfg.template.clone())?;

        info!(
            site = %name,
            constraint = %constraint,
            partition = %partition,
            cores_per_node = hardware.cores_per_node,
            "resolved site profile"
        );

        Ok(Self {
            name: name.to_string(),
            template,
            hardware,
            constraint: not_none(Some(constraint)),
            partition: not_none(Some(partition)),
            qos: not_none(qos),
            account: not_none(account),
        })
    }
}

fn pick(over: &Option<String>, default: &Option<String>, what: &str) -> Result<String> {
    over.clone().or_else(|| default.clone()).ok_or_else(|| {
        BatchdagError::config(format!(
            "no {what} given and the site has no default_{what}"
        ))
    })
}

fn not_none(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.trim().eq_ignore_ascii_case("none"))
}

/// Where site files live: explicit flag, then `BATCHDAG_SITE_DIR`, then
/// `./sites`.
pub fn resolve_site_dir(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    match std::env::var(SITE_DIR_ENV) {
        Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
        _ => PathBuf::from("sites"),
    }
}

pub fn site_file_path(site_dir: &Path, site: &str) -> PathBuf {
    site_dir.join(format!("{site}.toml"))
}

/// Load and deserialize `<site_dir>/<site>.toml`.
pub fn load_site(site_dir: &Path, site: &str) -> Result<SiteConfig> {
    let path = site_file_path(site_dir, site);
    let contents = fs::read_to_string(&path).map_err(|e| {
        BatchdagError::config(format!("cannot read site file {path:?} for site '{site}': {e}"))
    })?;
    let cfg: SiteConfig = toml::from_str(&contents)?;
    Ok(cfg)
}

/// Guess the site from well-known environment variables.
///
/// `env` is the variable lookup (normally `std::env::var(..).ok()`); it is a
/// parameter so detection stays testable.
pub fn detect_site<F>(env: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let found: Vec<String> = SITE_ENV_VARS
        .iter()
        .filter_map(|var| env(var))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect();

    match found.as_slice() {
        [] => {
            warn!(
                "no site given through --site and none detected; using the {GENERIC_SITE} template"
            );
            Ok(GENERIC_SITE.to_string())
        }
        [one] => {
            info!(site = %one, "no site given through --site; detected automatically");
            Ok(one.clone())
        }
        many => Err(BatchdagError::config(format!(
            "more than one site detected through environment variables: {many:?}; pass --site explicitly"
        ))),
    }
}
