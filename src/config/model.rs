// src/config/model.rs

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use crate::resources::ResourceHint;
use crate::types::StageName;

/// Top-level pipeline configuration as read from a TOML file.
///
/// ```toml
/// root_dir = "/scratch/me/pipelines"
///
/// [globals]
/// nsims = 100
///
/// [[track]]
/// path = "/home/me/code/mylib"
///
/// [stage.fetch]
/// exec = "python"
/// script = "fetch.py"
///
/// [stage.process]
/// exec = "python"
/// script = "process.py"
/// arg = ["a", "b"]
/// depends = ["fetch"]
/// ```
///
/// This is the *raw* deserialized shape; it has not been validated yet.
/// Use [`PipelineConfig::try_from`] (or `load_and_validate`) to get the
/// typed, checked form.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawPipelineConfig {
    /// Directory under which every project gets its own output tree.
    pub root_dir: PathBuf,

    /// Values stages can pull in through their `globals = [...]` list.
    #[serde(default)]
    pub globals: BTreeMap<String, OptionValue>,

    /// Source trees whose version is recorded with every stage run.
    #[serde(default)]
    pub track: Vec<TrackedEntry>,

    /// All stages from `[stage.<name>]`, in declaration order.
    #[serde(default)]
    pub stage: StageDeclarations,
}

/// `[stage.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawStageConfig {
    /// Interpreter used to run `script` (`python` / `python3`).
    pub exec: String,

    pub script: String,

    /// Positional argument. A list turns the stage into a sweep.
    #[serde(default)]
    pub arg: Option<RawArg>,

    #[serde(default)]
    pub options: BTreeMap<String, OptionValue>,

    /// Option names whose values come from `[globals]`.
    #[serde(default)]
    pub globals: Vec<String>,

    #[serde(default)]
    pub depends: Vec<String>,

    #[serde(default)]
    pub parallel: Option<RawParallel>,
}

/// `arg = "x"` or `arg = ["x", "y"]`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawArg {
    One(ScalarArg),
    Sweep(Vec<ScalarArg>),
}

/// Scalars accepted as positional arguments. Numbers are convenient for
/// sweeps like `arg = [1, 2, 3]`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ScalarArg {
    Int(i64),
    Float(f64),
    Str(String),
}

impl fmt::Display for ScalarArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarArg::Int(i) => write!(f, "{i}"),
            ScalarArg::Float(x) => f.write_str(&float_text(*x)),
            ScalarArg::Str(s) => f.write_str(s),
        }
    }
}

/// Floats keep a fractional part (`1.0`, not `1`), so they never collide
/// with integers in sweep names or lose their type on the command line.
fn float_text(x: f64) -> String {
    format!("{x:?}")
}

/// `[stage.<name>.parallel]` section.
///
/// Mirrors:
///
/// ```toml
/// [stage.fit.parallel]
/// nproc = 8
/// memory_gb = 12
/// min_threads = 4
/// walltime = "02:00:00"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawParallel {
    #[serde(default)]
    pub nproc: Option<u32>,
    #[serde(default)]
    pub threads: Option<u32>,
    #[serde(default)]
    pub memory_gb: Option<f64>,
    #[serde(default)]
    pub min_threads: Option<u32>,
    #[serde(default)]
    pub walltime: Option<String>,
}

/// `[[track]]` entry: a source tree whose git state is part of provenance.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrackedEntry {
    /// Key used in provenance records; defaults to the path.
    #[serde(default)]
    pub name: Option<String>,
    pub path: PathBuf,
    /// Version string used when `path` is not inside a git checkout.
    #[serde(default)]
    pub version: Option<String>,
}

impl TrackedEntry {
    pub fn key(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Value of a command-line option, either local (`options`) or global.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<OptionValue>),
}

impl OptionValue {
    /// Render as `--key value` tokens (unquoted).
    ///
    /// - `true` renders as a bare `--key` flag, `false` renders nothing.
    /// - lists render as `--key v1 v2 ...`.
    pub fn to_args(&self, key: &str) -> Vec<String> {
        let flag = format!("--{key}");
        match self {
            OptionValue::Bool(true) => vec![flag],
            OptionValue::Bool(false) => Vec::new(),
            OptionValue::List(items) => {
                let mut out = vec![flag];
                out.extend(items.iter().map(OptionValue::scalar_text));
                out
            }
            other => vec![flag, other.scalar_text()],
        }
    }

    fn scalar_text(&self) -> String {
        match self {
            OptionValue::Bool(b) => b.to_string(),
            OptionValue::Int(i) => i.to_string(),
            OptionValue::Float(x) => float_text(*x),
            OptionValue::Str(s) => s.clone(),
            OptionValue::List(items) => items
                .iter()
                .map(OptionValue::scalar_text)
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

/// Stage declarations in the order they appear in the file.
///
/// `toml` is built with `preserve_order`, so the map visitor sees tables in
/// document order and we keep that order here instead of sorting by name.
#[derive(Debug, Clone, Default)]
pub struct StageDeclarations(pub Vec<(StageName, RawStageConfig)>);

impl StageDeclarations {
    pub fn iter(&self) -> impl Iterator<Item = (&StageName, &RawStageConfig)> {
        self.0.iter().map(|(n, s)| (n, s))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|(n, _)| n == name)
    }

    pub fn push(&mut self, name: impl Into<StageName>, stage: RawStageConfig) {
        self.0.push((name.into(), stage));
    }
}

impl<'de> Deserialize<'de> for StageDeclarations {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct DeclVisitor;

        impl<'de> Visitor<'de> for DeclVisitor {
            type Value = StageDeclarations;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a table of [stage.<name>] sections")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut out = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((name, stage)) = map.next_entry::<String, RawStageConfig>()? {
                    out.push((name, stage));
                }
                Ok(StageDeclarations(out))
            }
        }

        deserializer.deserialize_map(DeclVisitor)
    }
}

/// Validated pipeline configuration.
///
/// Only constructible through `TryFrom<RawPipelineConfig>`, so holders can
/// rely on: supported exec kinds, no global/local option collisions, every
/// referenced global defined, and well-formed resource hints.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub root_dir: PathBuf,
    pub globals: BTreeMap<String, OptionValue>,
    pub track: Vec<TrackedEntry>,
    pub stages: Vec<DeclaredStage>,
}

impl PipelineConfig {
    pub(crate) fn new_unchecked(
        root_dir: PathBuf,
        globals: BTreeMap<String, OptionValue>,
        track: Vec<TrackedEntry>,
        stages: Vec<DeclaredStage>,
    ) -> Self {
        Self {
            root_dir,
            globals,
            track,
            stages,
        }
    }

    pub fn stage(&self, name: &str) -> Option<&DeclaredStage> {
        self.stages.iter().find(|s| s.name == name)
    }
}

/// Execution kind of a stage. Only script-style execution is supported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecKind {
    /// `<interpreter> <script> ...`
    Script { interpreter: String },
}

impl ExecKind {
    pub const SUPPORTED_INTERPRETERS: &'static [&'static str] = &["python", "python3"];

    pub fn program(&self) -> &str {
        match self {
            ExecKind::Script { interpreter } => interpreter,
        }
    }
}

/// Positional argument after validation.
#[derive(Debug, Clone, PartialEq)]
pub enum StageArg {
    One(String),
    Sweep(Vec<String>),
}

/// One `[stage.<name>]` declaration after schema validation but before sweep
/// expansion.
#[derive(Debug, Clone)]
pub struct DeclaredStage {
    pub name: StageName,
    pub exec: ExecKind,
    pub script: String,
    pub arg: Option<StageArg>,
    pub options: BTreeMap<String, OptionValue>,
    /// Option values pulled from `[globals]`, already resolved.
    pub global_options: BTreeMap<String, OptionValue>,
    pub depends: Vec<StageName>,
    pub resources: ResourceHint,
}
