// src/config/validate.rs

use std::collections::BTreeMap;

use crate::config::model::{
    DeclaredStage, ExecKind, OptionValue, PipelineConfig, RawArg, RawPipelineConfig,
    RawStageConfig, StageArg,
};
use crate::errors::{BatchdagError, Result};
use crate::resources::ResourceHint;

impl TryFrom<RawPipelineConfig> for PipelineConfig {
    type Error = crate::errors::BatchdagError;

    fn try_from(raw: RawPipelineConfig) -> std::result::Result<Self, Self::Error> {
        ensure_has_stages(&raw)?;
        validate_tracked_entries(&raw)?;

        let mut stages = Vec::with_capacity(raw.stage.len());
        for (name, stage) in raw.stage.iter() {
            stages.push(validate_stage(name, stage, &raw.globals)?);
        }

        Ok(PipelineConfig::new_unchecked(
            raw.root_dir,
            raw.globals,
            raw.track,
            stages,
        ))
    }
}

fn ensure_has_stages(cfg: &RawPipelineConfig) -> Result<()> {
    if cfg.stage.is_empty() {
        return Err(BatchdagError::config(
            "config must contain at least one [stage.<name>] section",
        ));
    }
    Ok(())
}

fn validate_tracked_entries(cfg: &RawPipelineConfig) -> Result<()> {
    let mut seen = BTreeMap::new();
    for entry in &cfg.track {
        let key = entry.key();
        if seen.insert(key.clone(), ()).is_some() {
            return Err(BatchdagError::config(format!(
                "[[track]] entry '{key}' is listed more than once"
            )));
        }
    }
    Ok(())
}

fn validate_stage(
    name: &str,
    raw: &RawStageConfig,
    globals: &BTreeMap<String, OptionValue>,
) -> Result<DeclaredStage> {
    if name.trim().is_empty() {
        return Err(BatchdagError::config("stage names must not be empty"));
    }

    let exec = validate_exec(name, &raw.exec)?;

    if raw.script.trim().is_empty() {
        return Err(BatchdagError::config(format!(
            "stage '{name}' has an empty `script`"
        )));
    }

    let arg = validate_arg(name, raw.arg.as_ref())?;
    let global_options = resolve_globals(name, raw, globals)?;

    let resources = ResourceHint::from_raw(name, raw.parallel.as_ref())?;

    Ok(DeclaredStage {
        name: name.to_string(),
        exec,
        script: raw.script.clone(),
        arg,
        options: raw.options.clone(),
        global_options,
        depends: raw.depends.clone(),
        resources,
    })
}

fn validate_exec(stage: &str, exec: &str) -> Result<ExecKind> {
    let exec = exec.trim();
    if ExecKind::SUPPORTED_INTERPRETERS.contains(&exec) {
        Ok(ExecKind::Script {
            interpreter: exec.to_string(),
        })
    } else {
        Err(BatchdagError::config(format!(
            "stage '{stage}' uses exec = \"{exec}\"; only script execution through {:?} is supported",
            ExecKind::SUPPORTED_INTERPRETERS
        )))
    }
}

fn validate_arg(stage: &str, arg: Option<&RawArg>) -> Result<Option<StageArg>> {
    match arg {
        None => Ok(None),
        Some(RawArg::One(v)) => {
            let s = v.to_string();
            if s.is_empty() {
                Ok(None)
            } else {
                Ok(Some(StageArg::One(s)))
            }
        }
        Some(RawArg::Sweep(values)) => {
            if values.is_empty() {
                return Err(BatchdagError::config(format!(
                    "stage '{stage}' has an empty `arg` list"
                )));
            }
            Ok(Some(StageArg::Sweep(
                values.iter().map(|v| v.to_string()).collect(),
            )))
        }
    }
}

fn resolve_globals(
    stage: &str,
    raw: &RawStageConfig,
    globals: &BTreeMap<String, OptionValue>,
) -> Result<BTreeMap<String, OptionValue>> {
    let mut out = BTreeMap::new();
    for key in &raw.globals {
        if raw.options.contains_key(key) {
            return Err(BatchdagError::config(format!(
                "option '{key}' in stage '{stage}' is both a local option and a global"
            )));
        }
        let value = globals.get(key).ok_or_else(|| {
            BatchdagError::config(format!(
                "stage '{stage}' pulls global '{key}' which is not defined in [globals]"
            ))
        })?;
        out.insert(key.clone(), value.clone());
    }
    Ok(out)
}
