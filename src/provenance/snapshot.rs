// src/provenance/snapshot.rs

//! Environment snapshots: the version state of every `[[track]]` entry.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::model::TrackedEntry;
use crate::errors::{BatchdagError, Result};
use crate::exec::process::run_capture;

/// Version state of one tracked source tree.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrackedVersion {
    /// Commit hash when the path is inside a git checkout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    /// Uncommitted or untracked changes present.
    #[serde(default)]
    pub dirty: bool,
    /// Informational only; not compared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Fallback version for non-git paths.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl TrackedVersion {
    pub fn same_state(&self, other: &TrackedVersion) -> bool {
        self.revision == other.revision
            && self.dirty == other.dirty
            && self.version == other.version
    }
}

/// Tracked entry key -> version state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EnvSnapshot {
    #[serde(default)]
    pub tracked: BTreeMap<String, TrackedVersion>,
}

impl EnvSnapshot {
    /// Probe every tracked entry.
    pub async fn capture(entries: &[TrackedEntry], probe: &dyn VersionProbe) -> Result<Self> {
        let mut tracked = BTreeMap::new();
        for entry in entries {
            let version = probe.probe(entry).await?;
            debug!(entry = %entry.key(), ?version, "probed tracked entry");
            tracked.insert(entry.key(), version);
        }
        Ok(Self { tracked })
    }

    /// Keys whose state differs between `self` (stored) and `current`.
    pub fn differences(&self, current: &EnvSnapshot) -> Vec<String> {
        let mut keys: Vec<&String> = self.tracked.keys().chain(current.tracked.keys()).collect();
        keys.sort();
        keys.dedup();
        keys.into_iter()
            .filter(|k| match (self.tracked.get(*k), current.tracked.get(*k)) {
                (Some(a), Some(b)) => !a.same_state(b),
                _ => true,
            })
            .cloned()
            .collect()
    }

    pub fn matches(&self, current: &EnvSnapshot) -> bool {
        self.differences(current).is_empty()
    }
}

/// Source of version information for tracked entries.
pub trait VersionProbe: Send + Sync {
    fn probe<'a>(
        &'a self,
        entry: &'a TrackedEntry,
    ) -> Pin<Box<dyn Future<Output = Result<TrackedVersion>> + Send + 'a>>;
}

/// Asks `git` about the checkout containing each tracked path.
#[derive(Debug, Clone, Default)]
pub struct GitProbe;

impl VersionProbe for GitProbe {
    fn probe<'a>(
        &'a self,
        entry: &'a TrackedEntry,
    ) -> Pin<Box<dyn Future<Output = Result<TrackedVersion>> + Send + 'a>> {
        Box::pin(async move {
            let dir = probe_dir(&entry.path);
            let dir_arg = dir.display().to_string();

            let head = run_capture("git", &["-C", &dir_arg, "rev-parse", "HEAD"]).await;
            let revision = match head {
                Ok(out) if out.success => Some(out.stdout.trim().to_string()),
                _ => None,
            };

            let Some(revision) = revision else {
                return fallback_version(entry);
            };

            let status = run_capture("git", &["-C", &dir_arg, "status", "--porcelain"]).await?;
            let dirty = !status.success || !status.stdout.trim().is_empty();

            let branch = run_capture("git", &["-C", &dir_arg, "rev-parse", "--abbrev-ref", "HEAD"])
                .await
                .ok()
                .filter(|o| o.success)
                .map(|o| o.stdout.trim().to_string());

            if dirty {
                info!(entry = %entry.key(), "tracked checkout has uncommitted changes");
            }

            Ok(TrackedVersion {
                revision: Some(revision),
                dirty,
                branch,
                version: entry.version.clone(),
            })
        })
    }
}

fn probe_dir(path: &Path) -> &Path {
    if path.is_file() {
        path.parent().unwrap_or(path)
    } else {
        path
    }
}

fn fallback_version(entry: &TrackedEntry) -> Result<TrackedVersion> {
    match &entry.version {
        Some(v) => Ok(TrackedVersion {
            version: Some(v.clone()),
            ..TrackedVersion::default()
        }),
        None => Err(BatchdagError::config(format!(
            "tracked path {:?} is not inside a git checkout and has no `version` to fall back on",
            entry.path
        ))),
    }
}
