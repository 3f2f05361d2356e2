// src/provenance/record.rs

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::model::OptionValue;
use crate::errors::Result;
use crate::plan::StageSpec;
use crate::provenance::snapshot::EnvSnapshot;
use crate::types::{BackendKind, StageName};

/// The part of a stage that decides whether a previous result is still
/// valid. Resource hints are not part of it.
///
/// Maps compare independent of key order, lists in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSnapshot {
    pub exec: String,
    pub script: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arg: Option<String>,
    #[serde(default)]
    pub depends: Vec<StageName>,
    #[serde(default)]
    pub options: BTreeMap<String, OptionValue>,
    /// Global values as resolved for this stage.
    #[serde(default)]
    pub globals: BTreeMap<String, OptionValue>,
}

impl StageSnapshot {
    pub fn of(stage: &StageSpec) -> Self {
        Self {
            exec: stage.exec.program().to_string(),
            script: stage.script.clone(),
            arg: stage.arg.clone(),
            depends: stage.depends.clone(),
            options: stage.options.clone(),
            globals: stage.global_options.clone(),
        }
    }

    /// blake3 of the canonical TOML rendering.
    pub fn digest(&self) -> Result<String> {
        let text = toml::to_string(self)?;
        Ok(blake3::hash(text.as_bytes()).to_hex().to_string())
    }
}

/// One successful attempt of one stage. Written once, never rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    pub stage: StageName,
    pub job_id: String,
    pub backend: BackendKind,
    pub created_at: DateTime<Utc>,
    pub spec_digest: String,
    pub spec: StageSnapshot,
    #[serde(default)]
    pub environment: EnvSnapshot,
}

impl ProvenanceRecord {
    pub fn new(
        stage: &StageSpec,
        job_id: impl Into<String>,
        backend: BackendKind,
        environment: EnvSnapshot,
    ) -> Result<Self> {
        let spec = StageSnapshot::of(stage);
        Ok(Self {
            stage: stage.name.clone(),
            job_id: job_id.into(),
            backend,
            created_at: Utc::now(),
            spec_digest: spec.digest()?,
            spec,
            environment,
        })
    }
}
