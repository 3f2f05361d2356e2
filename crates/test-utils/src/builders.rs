#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use batchdag::config::{
    OptionValue, PipelineConfig, RawArg, RawParallel, RawPipelineConfig, RawStageConfig,
    ScalarArg, StageDeclarations, TrackedEntry,
};
use batchdag::errors::BatchdagError;
use batchdag::plan::PipelinePlan;

/// Builder for `PipelineConfig` to simplify test setup.
///
/// Stages keep the order in which they are added, like a TOML file.
pub struct PipelineBuilder {
    config: RawPipelineConfig,
}

impl PipelineBuilder {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        Self {
            config: RawPipelineConfig {
                root_dir: root_dir.as_ref().to_path_buf(),
                globals: BTreeMap::new(),
                track: Vec::new(),
                stage: StageDeclarations::default(),
            },
        }
    }

    pub fn with_stage(mut self, name: &str, stage: StageBuilder) -> Self {
        self.config.stage.push(name, stage.build());
        self
    }

    pub fn with_global(mut self, key: &str, value: OptionValue) -> Self {
        self.config.globals.insert(key.to_string(), value);
        self
    }

    pub fn tracking(mut self, path: impl Into<PathBuf>, version: Option<&str>) -> Self {
        self.config.track.push(TrackedEntry {
            name: None,
            path: path.into(),
            version: version.map(str::to_string),
        });
        self
    }

    pub fn raw(self) -> RawPipelineConfig {
        self.config
    }

    pub fn try_build(self) -> Result<PipelineConfig, BatchdagError> {
        PipelineConfig::try_from(self.config)
    }

    pub fn build(self) -> PipelineConfig {
        self.try_build()
            .expect("Failed to build valid config from builder")
    }

    pub fn try_plan(self) -> Result<PipelinePlan, BatchdagError> {
        let cfg = self.try_build()?;
        PipelinePlan::build(&cfg)
    }

    pub fn plan(self) -> PipelinePlan {
        self.try_plan().expect("Failed to plan pipeline from builder")
    }
}

/// Builder for `[stage.<name>]` sections.
pub struct StageBuilder {
    stage: RawStageConfig,
}

impl StageBuilder {
    pub fn new(script: &str) -> Self {
        Self {
            stage: RawStageConfig {
                exec: "python".to_string(),
                script: script.to_string(),
                arg: None,
                options: BTreeMap::new(),
                globals: Vec::new(),
                depends: Vec::new(),
                parallel: None,
            },
        }
    }

    pub fn exec(mut self, exec: &str) -> Self {
        self.stage.exec = exec.to_string();
        self
    }

    pub fn arg(mut self, arg: &str) -> Self {
        self.stage.arg = Some(RawArg::One(ScalarArg::Str(arg.to_string())));
        self
    }

    pub fn sweep(mut self, values: &[&str]) -> Self {
        self.stage.arg = Some(RawArg::Sweep(
            values
                .iter()
                .map(|v| ScalarArg::Str(v.to_string()))
                .collect(),
        ));
        self
    }

    pub fn option(mut self, key: &str, value: OptionValue) -> Self {
        self.stage.options.insert(key.to_string(), value);
        self
    }

    pub fn global(mut self, key: &str) -> Self {
        self.stage.globals.push(key.to_string());
        self
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.stage.depends.push(dep.to_string());
        self
    }

    pub fn nproc(mut self, n: u32) -> Self {
        self.parallel().nproc = Some(n);
        self
    }

    pub fn threads(mut self, n: u32) -> Self {
        self.parallel().threads = Some(n);
        self
    }

    pub fn memory(mut self, gb: f64, min_threads: Option<u32>) -> Self {
        let p = self.parallel();
        p.memory_gb = Some(gb);
        p.min_threads = min_threads;
        self
    }

    pub fn walltime(mut self, wall: &str) -> Self {
        self.parallel().walltime = Some(wall.to_string());
        self
    }

    fn parallel(&mut self) -> &mut RawParallel {
        self.stage.parallel.get_or_insert_with(RawParallel::default)
    }

    pub fn build(self) -> RawStageConfig {
        self.stage
    }
}
