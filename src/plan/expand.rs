// src/plan/expand.rs

//! Sweep expansion: declared stages -> concrete stage instances.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use tracing::debug;

use crate::config::model::{DeclaredStage, ExecKind, OptionValue, StageArg};
use crate::errors::{BatchdagError, Result};
use crate::resources::ResourceHint;
use crate::types::StageName;

/// A concrete stage instance, ready to be ordered and run.
#[derive(Debug, Clone, PartialEq)]
pub struct StageSpec {
    pub name: StageName,
    /// Name of the sweep declaration this instance came from, if any.
    pub sweep_parent: Option<StageName>,
    pub exec: ExecKind,
    pub script: String,
    /// Single positional token.
    pub arg: Option<String>,
    pub options: BTreeMap<String, OptionValue>,
    pub global_options: BTreeMap<String, OptionValue>,
    /// Dependencies as declared; may name sweep parents.
    pub depends: Vec<StageName>,
    pub resources: ResourceHint,
}

impl StageSpec {
    /// Arguments after the script, unquoted: positional first, then local
    /// options, then global options.
    pub fn script_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(arg) = &self.arg {
            args.push(arg.clone());
        }
        for (key, value) in self.options.iter().chain(self.global_options.iter()) {
            args.extend(value.to_args(key));
        }
        args
    }

    /// Full argv for running the stage, with `--output-dir` appended.
    pub fn argv(&self, output_dir: &Path) -> Vec<String> {
        let mut argv = vec![self.exec.program().to_string(), self.script.clone()];
        argv.extend(self.script_args());
        argv.push("--output-dir".to_string());
        argv.push(output_dir.display().to_string());
        argv
    }

    /// The same invocation as one shell-quoted string (for batch scripts).
    pub fn command_line(&self, output_dir: &Path) -> String {
        self.argv(output_dir)
            .iter()
            .map(|a| shell_escape::escape(a.as_str().into()).into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Result of expanding all declarations.
#[derive(Debug, Clone, Default)]
pub struct Expansion {
    /// Concrete stages in declaration order (sweep instances in list order).
    pub stages: Vec<StageSpec>,
    /// Sweep parent name -> its instance names.
    pub sweeps: BTreeMap<StageName, Vec<StageName>>,
}

/// Expand sweep declarations into concrete stages.
///
/// - `arg = "x"` (or no arg): one stage, same name.
/// - `arg = ["x", "y"]`: stages `{name}_x`, `{name}_y`; `{name}` itself is not
///   a stage afterwards.
///
/// Every positional value must be exactly one shell token, since it is later
/// spliced into a single command line.
pub fn expand(declared: &[DeclaredStage]) -> Result<Expansion> {
    let declared_names: HashSet<&str> = declared.iter().map(|d| d.name.as_str()).collect();
    let mut seen: HashSet<StageName> = HashSet::new();
    let mut out = Expansion::default();

    for decl in declared {
        match &decl.arg {
            Some(StageArg::Sweep(values)) => {
                let mut instances = Vec::with_capacity(values.len());
                for value in values {
                    ensure_single_token(&decl.name, value)?;
                    let name = format!("{}_{}", decl.name, value);
                    if declared_names.contains(name.as_str()) {
                        return Err(BatchdagError::config(format!(
                            "sweep stage '{}' generates '{name}', which clashes with a declared stage; rename one of them",
                            decl.name
                        )));
                    }
                    if !seen.insert(name.clone()) {
                        return Err(BatchdagError::config(format!(
                            "sweep stage '{}' generates '{name}' more than once",
                            decl.name
                        )));
                    }
                    debug!(parent = %decl.name, stage = %name, "expanded sweep instance");
                    out.stages
                        .push(instance(decl, name.clone(), Some(value.clone()), true));
                    instances.push(name);
                }
                out.sweeps.insert(decl.name.clone(), instances);
            }
            Some(StageArg::One(value)) => {
                ensure_single_token(&decl.name, value)?;
                claim(&mut seen, &decl.name)?;
                out.stages
                    .push(instance(decl, decl.name.clone(), Some(value.clone()), false));
            }
            None => {
                claim(&mut seen, &decl.name)?;
                out.stages.push(instance(decl, decl.name.clone(), None, false));
            }
        }
    }

    Ok(out)
}

fn claim(seen: &mut HashSet<StageName>, name: &str) -> Result<()> {
    if !seen.insert(name.to_string()) {
        return Err(BatchdagError::config(format!(
            "stage name '{name}' is produced more than once"
        )));
    }
    Ok(())
}

fn instance(decl: &DeclaredStage, name: StageName, arg: Option<String>, swept: bool) -> StageSpec {
    StageSpec {
        name,
        sweep_parent: swept.then(|| decl.name.clone()),
        exec: decl.exec.clone(),
        script: decl.script.clone(),
        arg,
        options: decl.options.clone(),
        global_options: decl.global_options.clone(),
        depends: decl.depends.clone(),
        resources: decl.resources.clone(),
    }
}

fn ensure_single_token(stage: &str, value: &str) -> Result<()> {
    let tokens = split_shell_words(value).map_err(|e| {
        BatchdagError::config(format!("argument {value:?} of stage '{stage}': {e}"))
    })?;
    if tokens.len() != 1 {
        return Err(BatchdagError::config(format!(
            "argument {value:?} of stage '{stage}' must be exactly one shell token (got {})",
            tokens.len()
        )));
    }
    Ok(())
}

/// Split `input` into words the way a POSIX shell would, `#` comments
/// included.
pub fn split_shell_words(input: &str) -> std::result::Result<Vec<String>, String> {
    shlex::split(input).ok_or_else(|| "unbalanced quotes or trailing backslash".to_string())
}
